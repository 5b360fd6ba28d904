use super::{SymbolScheduler, TickOutcome};
use crate::config::EngineConfig;
use crate::ledger::LedgerStore;
use crate::settlement::SettlementEngine;
use exchange_api::{EventSink, MarketCalendar, Symbol};
use log::warn;
use quote_gateway::QuoteResolver;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Owns one scheduler actor per symbol, created lazily on the first
/// signal and kept for the life of the process.
pub struct SchedulerRegistry {
    ledger: Arc<dyn LedgerStore>,
    resolver: Arc<QuoteResolver>,
    settlement: Arc<SettlementEngine>,
    events: Arc<dyn EventSink>,
    calendar: Arc<dyn MarketCalendar>,
    config: Arc<EngineConfig>,
    schedulers: RwLock<HashMap<Symbol, Arc<SymbolScheduler>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerRegistry {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        resolver: Arc<QuoteResolver>,
        settlement: Arc<SettlementEngine>,
        events: Arc<dyn EventSink>,
        calendar: Arc<dyn MarketCalendar>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            settlement,
            events,
            calendar,
            config,
            schedulers: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The actor for `symbol`, spawning its wake loop on first use.
    pub async fn scheduler(&self, symbol: &Symbol) -> Arc<SymbolScheduler> {
        if let Some(existing) = self.schedulers.read().await.get(symbol) {
            return Arc::clone(existing);
        }

        let mut guard = self.schedulers.write().await;
        if let Some(existing) = guard.get(symbol) {
            return Arc::clone(existing);
        }
        let scheduler = Arc::new(SymbolScheduler::new(
            symbol.clone(),
            Arc::clone(&self.ledger),
            Arc::clone(&self.resolver),
            Arc::clone(&self.settlement),
            Arc::clone(&self.events),
            Arc::clone(&self.calendar),
            Arc::clone(&self.config),
        ));
        self.tasks.lock().await.push(scheduler.spawn());
        guard.insert(symbol.clone(), Arc::clone(&scheduler));
        scheduler
    }

    /// Tick the symbol's actor now, retrying with linear backoff while
    /// it is busy. A symbol that stays busy through every attempt is
    /// left to its own scheduled wake.
    pub async fn signal(&self, symbol: &Symbol) -> TickOutcome {
        let scheduler = self.scheduler(symbol).await;
        let attempts = self.config.signal_attempts.max(1);
        for attempt in 1..=attempts {
            match scheduler.tick().await {
                TickOutcome::Busy if attempt < attempts => {
                    tokio::time::sleep(Duration::from_millis(
                        self.config.signal_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                }
                TickOutcome::Busy => break,
                outcome => return outcome,
            }
        }
        warn!("scheduler for {symbol} stayed busy through {attempts} signal attempts");
        TickOutcome::Busy
    }

    /// Stop every wake loop. Used on shutdown; in-flight ticks finish
    /// at the next await point.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use exchange_api::{
        AgentId, BroadcastSink, Order, OrderRequest, Portfolio, Side, UsEquityCalendar,
    };
    use quote_gateway::{MockProvider, ResolverConfig};

    fn registry() -> SchedulerRegistry {
        let ledger = Arc::new(MemoryLedger::new());
        let resolver = Arc::new(QuoteResolver::new(
            Box::new(MockProvider::fixed("primary", 50.0)),
            Box::new(MockProvider::failing("backup")),
            ResolverConfig::default(),
        ));
        let events: Arc<dyn EventSink> = Arc::new(BroadcastSink::new(16));
        let settlement = Arc::new(SettlementEngine::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::clone(&resolver),
            Arc::clone(&events),
        ));
        SchedulerRegistry::new(
            ledger,
            resolver,
            settlement,
            events,
            Arc::new(UsEquityCalendar),
            Arc::new(EngineConfig {
                signal_backoff_ms: 10,
                ..EngineConfig::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_registry_reuses_actor_per_symbol() {
        let registry = registry();
        let symbol = Symbol::new("ABC").unwrap();
        let a = registry.scheduler(&symbol).await;
        let b = registry.scheduler(&symbol).await;
        assert!(Arc::ptr_eq(&a, &b));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_signal_gives_up_when_actor_stays_busy() {
        let registry = registry();
        let symbol = Symbol::new("ABC").unwrap();
        let scheduler = registry.scheduler(&symbol).await;

        let _held = scheduler.busy.lock().await;
        assert_eq!(registry.signal(&symbol).await, TickOutcome::Busy);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_signal_ticks_idle_symbol() {
        let registry = registry();
        let symbol = Symbol::new("ABC").unwrap();
        assert_eq!(registry.signal(&symbol).await, TickOutcome::Idle);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_signal_reports_market_closed() {
        let registry = registry();
        let agent = AgentId::new("agent-1");
        registry
            .ledger
            .upsert_portfolio(Portfolio::new(agent.clone(), 1000.0))
            .await;
        let symbol = Symbol::new("ABC").unwrap();
        let order = Order::new(
            agent,
            symbol.clone(),
            Side::Buy,
            1.0,
            OrderRequest::Market,
            None,
            None,
        )
        .unwrap();
        registry.ledger.insert_order(order).await;

        // The outcome depends on the wall clock, but it is never Busy
        // and never Idle with a pending order present.
        let outcome = registry.signal(&symbol).await;
        assert_ne!(outcome, TickOutcome::Busy);
        assert_ne!(outcome, TickOutcome::Idle);
        registry.shutdown().await;
    }
}
