mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exchange_api::{
    AgentId, Holding, LedgerError, Order, OrderStatus, Portfolio, QuoteSource, SettleError, Side,
    Symbol, TransactionRecord,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit row written for every execution attempt, successful or not.
/// One order can accumulate several of these across retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub order_id: Uuid,
    pub attempt_id: Uuid,
    pub status: OrderStatus,
    pub quote_price: f64,
    pub market_source: QuoteSource,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// All balance and position mutations for one fill, applied atomically
/// by the ledger or not at all.
#[derive(Debug, Clone)]
pub struct SettlementBatch {
    pub agent_id: AgentId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub market_source: QuoteSource,
    pub reasoning: Option<String>,
    /// The order being settled, excluded from the pending-sell
    /// reservation so it does not block itself.
    pub exclude_order_id: Option<Uuid>,
}

/// Result of a conditional pending-to-executing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Another actor moved the order out of `pending` first. The loser
    /// walks away; no state was written.
    Lost,
}

/// Persistence seam for portfolios, holdings, orders, and trade
/// history. Every mutation that races is expressed as a conditional
/// update so correctness does not depend on caller-side locking.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn upsert_portfolio(&self, portfolio: Portfolio);
    async fn portfolio(&self, agent_id: &AgentId) -> Option<Portfolio>;
    async fn holdings(&self, agent_id: &AgentId) -> Vec<Holding>;
    async fn holding(&self, agent_id: &AgentId, symbol: &Symbol) -> Option<Holding>;

    async fn insert_order(&self, order: Order);
    async fn order(&self, id: Uuid) -> Option<Order>;
    /// Pending orders for one symbol, oldest first.
    async fn pending_orders_for_symbol(&self, symbol: &Symbol) -> Vec<Order>;
    /// Pending buy orders across all symbols for one agent, minus the
    /// excluded order. Used to value outstanding buy commitments.
    async fn open_buy_orders(&self, agent_id: &AgentId, exclude: Uuid) -> Vec<Order>;
    /// Total quantity tied up in this agent's non-terminal sell orders
    /// for the symbol.
    async fn reserved_sell_quantity(
        &self,
        agent_id: &AgentId,
        symbol: &Symbol,
        exclude: Option<Uuid>,
    ) -> f64;
    /// Symbols with at least one pending or executing order.
    async fn active_symbols(&self) -> Vec<Symbol>;

    /// Conditional `pending -> executing` transition. Stamps the
    /// attempt id, bumps the attempt counter, and records the claim
    /// time; returns `Lost` without writing if the order is no longer
    /// pending.
    async fn claim_order(&self, id: Uuid, attempt_id: Uuid, now: DateTime<Utc>) -> ClaimOutcome;
    /// Atomically verify and apply one fill: the cash or share
    /// precondition and every resulting mutation happen under a single
    /// critical section.
    async fn apply_settlement(&self, batch: &SettlementBatch) -> Result<(), SettleError>;
    /// Terminal fill stamp. `quantity` is what actually settled, which
    /// can be below the requested size after a buying-power cap.
    async fn mark_filled(&self, id: Uuid, price: f64, quantity: f64);
    async fn mark_rejected(&self, id: Uuid, reason: &str);
    /// Agent-initiated cancel; only valid from `pending`.
    async fn cancel_order(&self, id: Uuid) -> Result<(), LedgerError>;
    async fn update_trail_watermark(&self, id: Uuid, high: Option<f64>, low: Option<f64>);
    async fn set_equity(&self, agent_id: &AgentId, equity: f64);

    /// Revert `executing` orders claimed before `older_than` back to
    /// `pending`. The attempt counter is left alone; the reclaim is
    /// bookkeeping, not a new attempt.
    async fn reclaim_stuck(&self, older_than: DateTime<Utc>) -> usize;
    /// Expire pending orders whose deadline has passed.
    async fn expire_due(&self, now: DateTime<Utc>) -> usize;

    async fn record_attempt(&self, attempt: ExecutionAttempt);
    async fn finish_attempt(
        &self,
        order_id: Uuid,
        attempt_id: Uuid,
        status: OrderStatus,
        error: Option<String>,
    );
    async fn attempts_for_order(&self, order_id: Uuid) -> Vec<ExecutionAttempt>;
    async fn transactions(&self, agent_id: &AgentId) -> Vec<TransactionRecord>;
}
