use crate::cache::QuoteCache;
use crate::overrides::{override_price, placeholder_quote};
use crate::provider::{ProviderQuote, QuoteProvider};
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

use exchange_api::{normalize_price, Quote, QuoteSource, Symbol};

fn default_max_age_secs() -> u64 {
    90
}

fn default_provider_ttl_secs() -> u64 {
    30
}

fn default_override_ttl_secs() -> u64 {
    15
}

/// Staleness bounds for the resolution chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Maximum age at which a cached quote is still served as fresh.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Write-through freshness window for provider hits.
    #[serde(default = "default_provider_ttl_secs")]
    pub provider_ttl_secs: u64,
    /// Freshness window for emergency override values.
    #[serde(default = "default_override_ttl_secs")]
    pub override_ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            provider_ttl_secs: default_provider_ttl_secs(),
            override_ttl_secs: default_override_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub force_refresh: bool,
    pub max_age: Option<Duration>,
}

impl ResolveOptions {
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
            max_age: None,
        }
    }
}

/// Resolves a usable price through the ordered fallback chain:
/// cache, primary provider, backup provider, emergency override,
/// stale cache, placeholder. Never fails; a degraded result carries a
/// degraded provenance tag instead.
pub struct QuoteResolver {
    primary: Box<dyn QuoteProvider>,
    backup: Box<dyn QuoteProvider>,
    cache: QuoteCache,
    config: ResolverConfig,
}

impl QuoteResolver {
    pub fn new(
        primary: Box<dyn QuoteProvider>,
        backup: Box<dyn QuoteProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            primary,
            backup,
            cache: QuoteCache::new(),
            config,
        }
    }

    pub async fn resolve(&self, symbol: &Symbol, opts: ResolveOptions) -> Quote {
        let max_age = opts
            .max_age
            .unwrap_or(Duration::from_secs(self.config.max_age_secs));

        if !opts.force_refresh {
            if let Some(hit) = self.cache.get_fresh(symbol, max_age).await {
                debug!("quote cache hit for {symbol} at {}", hit.price);
                return hit;
            }
        }

        match self.primary.fetch(symbol).await {
            Ok(raw) => return self.accept(symbol, raw, QuoteSource::Primary).await,
            Err(err) => {
                warn!("{} quote provider failed for {symbol}: {err}", self.primary.name());
            }
        }

        match self.backup.fetch(symbol).await {
            Ok(raw) => return self.accept(symbol, raw, QuoteSource::Backup).await,
            Err(err) => {
                warn!("{} quote provider failed for {symbol}: {err}", self.backup.name());
            }
        }

        if let Some(price) = override_price(symbol) {
            warn!("both providers down for {symbol}; serving emergency override");
            let quote = Quote::new(symbol.clone(), normalize_price(price), QuoteSource::Override);
            self.cache
                .put(
                    quote.clone(),
                    Duration::from_secs(self.config.override_ttl_secs),
                )
                .await;
            return quote;
        }

        if let Some(stale) = self.cache.get_stale(symbol).await {
            warn!(
                "both providers down for {symbol}; serving stale cache value {}",
                stale.price
            );
            return stale;
        }

        warn!("no price available for {symbol}; serving placeholder");
        placeholder_quote(symbol)
    }

    async fn accept(&self, symbol: &Symbol, raw: ProviderQuote, source: QuoteSource) -> Quote {
        let mut quote = Quote::new(symbol.clone(), normalize_price(raw.price), source);
        if let Some(as_of) = raw.as_of {
            quote.as_of = as_of;
        }
        quote.change_percent = raw.change_percent;
        quote.high = raw.high;
        quote.low = raw.low;
        quote.volume = raw.volume;

        self.cache
            .put(
                quote.clone(),
                Duration::from_secs(self.config.provider_ttl_secs),
            )
            .await;
        quote
    }

    /// Test hook: seed the cache directly.
    pub async fn seed_cache(&self, quote: Quote, fresh_ttl: Duration, age: Duration) {
        self.cache.put_aged(quote, fresh_ttl, age).await;
    }
}
