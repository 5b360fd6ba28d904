use exchange_api::{Quote, QuoteSource, Symbol};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    inserted_at: Instant,
    fresh_ttl: Duration,
}

/// In-memory quote cache. Entries past their freshness window are
/// retained so the resolver can fall back to them as stale values.
#[derive(Default)]
pub struct QuoteCache {
    inner: RwLock<HashMap<String, CachedQuote>>,
}

impl QuoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A quote still inside both its own freshness window and the
    /// caller's `max_age` bound, re-tagged with `Cache` provenance.
    pub async fn get_fresh(&self, symbol: &Symbol, max_age: Duration) -> Option<Quote> {
        let guard = self.inner.read().await;
        let entry = guard.get(symbol.as_str())?;
        let age = entry.inserted_at.elapsed();
        if age > entry.fresh_ttl || age > max_age {
            return None;
        }
        if entry.quote.price <= 0.0 {
            return None;
        }
        let mut quote = entry.quote.clone();
        quote.source = QuoteSource::Cache;
        Some(quote)
    }

    /// The most recent value regardless of age, re-tagged `StaleCache`
    /// so callers can warn. Placeholders are never cached, so a hit is
    /// always a once-real price.
    pub async fn get_stale(&self, symbol: &Symbol) -> Option<Quote> {
        let guard = self.inner.read().await;
        let entry = guard.get(symbol.as_str())?;
        if entry.quote.price <= 0.0 {
            return None;
        }
        let mut quote = entry.quote.clone();
        quote.source = QuoteSource::StaleCache;
        Some(quote)
    }

    pub async fn put(&self, quote: Quote, fresh_ttl: Duration) {
        self.put_aged(quote, fresh_ttl, Duration::ZERO).await;
    }

    /// Insert with a back-dated age. Tests use this to exercise the
    /// staleness fallback without sleeping.
    pub async fn put_aged(&self, quote: Quote, fresh_ttl: Duration, age: Duration) {
        if quote.is_placeholder() {
            return;
        }
        let inserted_at = Instant::now().checked_sub(age).unwrap_or_else(Instant::now);
        let mut guard = self.inner.write().await;
        guard.insert(
            quote.symbol.as_str().to_string(),
            CachedQuote {
                quote,
                inserted_at,
                fresh_ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote::new(Symbol::new(symbol).unwrap(), price, QuoteSource::Primary)
    }

    #[tokio::test]
    async fn test_fresh_hit_is_retagged_cache() {
        let cache = QuoteCache::new();
        cache.put(quote("ABC", 50.0), Duration::from_secs(30)).await;

        let hit = cache
            .get_fresh(&Symbol::new("ABC").unwrap(), Duration::from_secs(90))
            .await
            .unwrap();
        assert_eq!(hit.source, QuoteSource::Cache);
        assert_eq!(hit.price, 50.0);
    }

    #[tokio::test]
    async fn test_expired_entry_only_served_stale() {
        let cache = QuoteCache::new();
        cache
            .put_aged(
                quote("ABC", 50.0),
                Duration::from_secs(30),
                Duration::from_secs(300),
            )
            .await;

        let symbol = Symbol::new("ABC").unwrap();
        assert!(cache.get_fresh(&symbol, Duration::from_secs(90)).await.is_none());

        let stale = cache.get_stale(&symbol).await.unwrap();
        assert_eq!(stale.source, QuoteSource::StaleCache);
    }

    #[tokio::test]
    async fn test_placeholder_is_never_cached() {
        let cache = QuoteCache::new();
        let symbol = Symbol::new("XYZ").unwrap();
        cache
            .put(
                Quote::new(symbol.clone(), 0.01, QuoteSource::Placeholder),
                Duration::from_secs(30),
            )
            .await;

        assert!(cache.get_stale(&symbol).await.is_none());
    }
}
