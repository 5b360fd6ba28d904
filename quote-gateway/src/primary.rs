use crate::provider::{ProviderQuote, QuoteError, QuoteProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exchange_api::Symbol;
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Finnhub-style quote body: current price, percent change, day range,
/// unix timestamp.
#[derive(Debug, Deserialize)]
struct PrimaryQuoteBody {
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
    #[serde(default)]
    h: Option<f64>,
    #[serde(default)]
    l: Option<f64>,
    #[serde(default)]
    t: Option<i64>,
}

/// Authenticated primary provider. Higher rate limit, first in the
/// chain after the cache.
pub struct PrimaryProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PrimaryProvider {
    /// Fails only if the HTTP client cannot be built; a client without
    /// the request timeout is never constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl QuoteProvider for PrimaryProvider {
    fn name(&self) -> &str {
        "primary"
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<ProviderQuote, QuoteError> {
        let url = format!("{}/quote?symbol={}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(QuoteError::RateLimited);
        }
        if !status.is_success() {
            return Err(QuoteError::Status(status.as_u16()));
        }

        let body: PrimaryQuoteBody = response.json().await?;
        let price = body.c.filter(|p| p.is_finite() && *p > 0.0).ok_or_else(|| {
            QuoteError::BadPayload(format!("no usable price for {symbol}"))
        })?;

        let as_of = body
            .t
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        Ok(ProviderQuote {
            price,
            change_percent: body.dp,
            high: body.h,
            low: body.l,
            volume: None,
            as_of,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_client_with_timeout() {
        assert!(PrimaryProvider::new("https://example.test", "key").is_ok());
    }
}
