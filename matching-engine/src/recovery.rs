use crate::config::EngineConfig;
use crate::ledger::LedgerStore;
use crate::scheduler::SchedulerRegistry;
use chrono::{Duration, Utc};
use exchange_api::MarketCalendar;
use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reclaimed: usize,
    pub expired: usize,
    pub signalled: usize,
}

/// Periodic safety net behind the event-driven path: reclaims orders
/// stranded in `executing` by a crashed tick, expires orders past
/// their deadline, and nudges every symbol that still has live orders
/// so a lost wake never strands them.
pub struct RecoverySweep {
    ledger: Arc<dyn LedgerStore>,
    registry: Arc<SchedulerRegistry>,
    calendar: Arc<dyn MarketCalendar>,
    config: Arc<EngineConfig>,
}

impl RecoverySweep {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        registry: Arc<SchedulerRegistry>,
        calendar: Arc<dyn MarketCalendar>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            ledger,
            registry,
            calendar,
            config,
        }
    }

    pub async fn run_once(&self) -> SweepReport {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(self.config.claim_timeout_secs as i64);
        let reclaimed = self.ledger.reclaim_stuck(cutoff).await;
        let expired = self.ledger.expire_due(now).await;

        let mut signalled = 0;
        if self.calendar.is_open(now) {
            for symbol in self.ledger.active_symbols().await {
                self.registry.signal(&symbol).await;
                signalled += 1;
            }
        }

        if reclaimed > 0 || expired > 0 {
            info!("recovery sweep reclaimed {reclaimed} stuck, expired {expired} orders");
        }
        SweepReport {
            reclaimed,
            expired,
            signalled,
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(self.config.sweep_interval_secs);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }
}
