use crate::model::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a resolved price came from, in decreasing order of quality.
/// `StaleCache` and `Placeholder` are degraded results that callers may
/// want to surface to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Primary,
    Backup,
    Cache,
    StaleCache,
    Override,
    Placeholder,
}

impl QuoteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Primary => "primary",
            QuoteSource::Backup => "backup",
            QuoteSource::Cache => "cache",
            QuoteSource::StaleCache => "stale_cache",
            QuoteSource::Override => "override",
            QuoteSource::Placeholder => "placeholder",
        }
    }
}

/// Ephemeral price snapshot. Not persisted beyond the cache layer;
/// always re-derivable from the provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub source: QuoteSource,
    pub as_of: DateTime<Utc>,
    pub change_percent: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<u64>,
}

impl Quote {
    pub fn new(symbol: Symbol, price: f64, source: QuoteSource) -> Self {
        Self {
            symbol,
            price,
            source,
            as_of: Utc::now(),
            change_percent: None,
            high: None,
            low: None,
            volume: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == QuoteSource::Placeholder
    }
}

/// Rounds to the cent with a one-cent floor. Sub-penny instruments
/// (worth less than a cent) keep four decimal places instead so they
/// do not collapse to the floor.
pub fn normalize_price(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.01;
    }
    if value < 0.01 {
        let rounded = (value * 10_000.0).round() / 10_000.0;
        return rounded.max(0.0001);
    }
    ((value * 100.0).round() / 100.0).max(0.01)
}
