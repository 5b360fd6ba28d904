use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exchange_api::Symbol;
use thiserror::Error;

/// Raw quote payload as returned by an external price service, before
/// normalization. Timestamps come from the provider when present.
#[derive(Debug, Clone)]
pub struct ProviderQuote {
    pub price: f64,
    pub change_percent: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<u64>,
    pub as_of: Option<DateTime<Utc>>,
}

/// Transient infrastructure failures. Absorbed by the resolver's
/// fallback chain, never surfaced as order failures.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider rate limited")]
    RateLimited,
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("unusable payload: {0}")]
    BadPayload(String),
}

/// One external price service. Implementations make exactly one
/// attempt per call; the resolver's staleness fallback substitutes for
/// retries.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, symbol: &Symbol) -> Result<ProviderQuote, QuoteError>;
}
