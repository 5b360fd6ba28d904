use anyhow::Context;
use quote_gateway::ResolverConfig;
use serde::Deserialize;
use std::path::Path;

fn default_trailing_cadence_ms() -> u64 {
    2_000
}

fn default_base_cadence_ms() -> u64 {
    10_000
}

fn default_wake_jitter() -> f64 {
    0.1
}

fn default_open_buffer_secs() -> u64 {
    30
}

fn default_claim_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_trail_persist_threshold() -> f64 {
    0.005
}

fn default_signal_attempts() -> u32 {
    3
}

fn default_signal_backoff_ms() -> u64 {
    300
}

/// Engine tuning knobs. Every field has a production default so an
/// empty `{}` config file is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Tick cadence while a trailing stop is resting on the symbol.
    #[serde(default = "default_trailing_cadence_ms")]
    pub trailing_cadence_ms: u64,
    /// Tick cadence for everything else.
    #[serde(default = "default_base_cadence_ms")]
    pub base_cadence_ms: u64,
    /// Fractional jitter applied to every scheduled wake, to spread
    /// symbol actors that would otherwise tick in lockstep.
    #[serde(default = "default_wake_jitter")]
    pub wake_jitter: f64,
    /// Delay past the opening bell before a closed-market wake fires.
    #[serde(default = "default_open_buffer_secs")]
    pub open_buffer_secs: u64,
    /// Age past which an `executing` claim is considered abandoned.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Minimum fractional move before a trailing watermark is persisted.
    #[serde(default = "default_trail_persist_threshold")]
    pub trail_persist_threshold: f64,
    /// Busy-retry policy for external scheduler signals.
    #[serde(default = "default_signal_attempts")]
    pub signal_attempts: u32,
    #[serde(default = "default_signal_backoff_ms")]
    pub signal_backoff_ms: u64,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trailing_cadence_ms: default_trailing_cadence_ms(),
            base_cadence_ms: default_base_cadence_ms(),
            wake_jitter: default_wake_jitter(),
            open_buffer_secs: default_open_buffer_secs(),
            claim_timeout_secs: default_claim_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            trail_persist_threshold: default_trail_persist_threshold(),
            signal_attempts: default_signal_attempts(),
            signal_backoff_ms: default_signal_backoff_ms(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}
