use crate::provider::{ProviderQuote, QuoteError, QuoteProvider};
use async_trait::async_trait;
use exchange_api::Symbol;
use std::sync::{Arc, Mutex};

/// Scriptable provider for tests. A `None` price makes every fetch
/// fail; clones share the same price cell so tests can move the market
/// between ticks.
#[derive(Clone)]
pub struct MockProvider {
    name: &'static str,
    price: Arc<Mutex<Option<f64>>>,
    calls: Arc<Mutex<u32>>,
}

impl MockProvider {
    pub fn fixed(name: &'static str, price: f64) -> Self {
        Self {
            name,
            price: Arc::new(Mutex::new(Some(price))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            price: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = Some(price);
    }

    pub fn fail(&self) {
        *self.price.lock().unwrap() = None;
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl QuoteProvider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, _symbol: &Symbol) -> Result<ProviderQuote, QuoteError> {
        *self.calls.lock().unwrap() += 1;
        match *self.price.lock().unwrap() {
            Some(price) => Ok(ProviderQuote {
                price,
                change_percent: None,
                high: None,
                low: None,
                volume: None,
                as_of: None,
            }),
            None => Err(QuoteError::Status(503)),
        }
    }
}
