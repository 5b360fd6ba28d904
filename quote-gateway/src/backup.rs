use crate::provider::{ProviderQuote, QuoteError, QuoteProvider};
use async_trait::async_trait;
use exchange_api::Symbol;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// The public endpoint blocks obvious non-browser clients.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct BackupBody {
    #[serde(rename = "quoteResponse")]
    quote_response: Option<BackupQuoteResponse>,
}

#[derive(Debug, Deserialize)]
struct BackupQuoteResponse {
    #[serde(default)]
    result: Vec<BackupResult>,
}

#[derive(Debug, Deserialize)]
struct BackupResult {
    #[serde(rename = "regularMarketPrice")]
    price: Option<f64>,
    #[serde(rename = "regularMarketChangePercent")]
    change_percent: Option<f64>,
    #[serde(rename = "regularMarketDayHigh")]
    high: Option<f64>,
    #[serde(rename = "regularMarketDayLow")]
    low: Option<f64>,
    #[serde(rename = "regularMarketVolume")]
    volume: Option<u64>,
}

/// Public, unauthenticated backup provider. Lower reliability, used
/// only when the primary fails.
pub struct BackupProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BackupProvider {
    /// Fails only if the HTTP client cannot be built; a client without
    /// the request timeout is never constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl QuoteProvider for BackupProvider {
    fn name(&self) -> &str {
        "backup"
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<ProviderQuote, QuoteError> {
        let url = format!("{}/v7/finance/quote?symbols={}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(QuoteError::RateLimited);
        }
        if !status.is_success() {
            return Err(QuoteError::Status(status.as_u16()));
        }

        let body: BackupBody = response.json().await?;
        let result = body
            .quote_response
            .and_then(|r| r.result.into_iter().next())
            .ok_or_else(|| QuoteError::BadPayload(format!("empty result for {symbol}")))?;

        let price = result
            .price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| QuoteError::BadPayload(format!("no usable price for {symbol}")))?;

        Ok(ProviderQuote {
            price,
            change_percent: result.change_percent,
            high: result.high,
            low: result.low,
            volume: result.volume,
            as_of: None,
        })
    }
}
