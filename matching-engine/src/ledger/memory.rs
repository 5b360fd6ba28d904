use super::{ClaimOutcome, ExecutionAttempt, LedgerStore, SettlementBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exchange_api::{
    AgentId, Holding, LedgerError, Order, OrderStatus, Portfolio, SettleError, Side, Symbol,
    TransactionRecord,
};
use log::debug;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    portfolios: HashMap<AgentId, Portfolio>,
    holdings: HashMap<(AgentId, Symbol), Holding>,
    /// Insertion order doubles as the FIFO tiebreak for orders created
    /// in the same instant.
    orders: Vec<Order>,
    attempts: Vec<ExecutionAttempt>,
    transactions: Vec<TransactionRecord>,
}

impl LedgerState {
    fn order_mut(&mut self, id: Uuid) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }

    fn reserved_sell_quantity(
        &self,
        agent_id: &AgentId,
        symbol: &Symbol,
        exclude: Option<Uuid>,
    ) -> f64 {
        self.orders
            .iter()
            .filter(|o| {
                o.agent_id == *agent_id
                    && o.symbol == *symbol
                    && o.side == Side::Sell
                    && matches!(o.status, OrderStatus::Pending | OrderStatus::Executing)
                    && Some(o.id) != exclude
            })
            .map(|o| o.quantity)
            .sum()
    }
}

/// Single-process ledger behind one mutex. Holding the lock across
/// check and mutation is what makes every conditional update atomic.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn upsert_portfolio(&self, portfolio: Portfolio) {
        let mut state = self.state.lock().await;
        state.portfolios.insert(portfolio.agent_id.clone(), portfolio);
    }

    async fn portfolio(&self, agent_id: &AgentId) -> Option<Portfolio> {
        self.state.lock().await.portfolios.get(agent_id).cloned()
    }

    async fn holdings(&self, agent_id: &AgentId) -> Vec<Holding> {
        self.state
            .lock()
            .await
            .holdings
            .iter()
            .filter(|((agent, _), _)| agent == agent_id)
            .map(|(_, h)| h.clone())
            .collect()
    }

    async fn holding(&self, agent_id: &AgentId, symbol: &Symbol) -> Option<Holding> {
        self.state
            .lock()
            .await
            .holdings
            .get(&(agent_id.clone(), symbol.clone()))
            .cloned()
    }

    async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.push(order);
    }

    async fn order(&self, id: Uuid) -> Option<Order> {
        self.state
            .lock()
            .await
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned()
    }

    async fn pending_orders_for_symbol(&self, symbol: &Symbol) -> Vec<Order> {
        let state = self.state.lock().await;
        let mut pending: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.symbol == *symbol && o.status == OrderStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|o| o.created_at);
        pending
    }

    async fn open_buy_orders(&self, agent_id: &AgentId, exclude: Uuid) -> Vec<Order> {
        self.state
            .lock()
            .await
            .orders
            .iter()
            .filter(|o| {
                o.agent_id == *agent_id
                    && o.side == Side::Buy
                    && o.id != exclude
                    && matches!(o.status, OrderStatus::Pending | OrderStatus::Executing)
            })
            .cloned()
            .collect()
    }

    async fn reserved_sell_quantity(
        &self,
        agent_id: &AgentId,
        symbol: &Symbol,
        exclude: Option<Uuid>,
    ) -> f64 {
        self.state
            .lock()
            .await
            .reserved_sell_quantity(agent_id, symbol, exclude)
    }

    async fn active_symbols(&self) -> Vec<Symbol> {
        let state = self.state.lock().await;
        let mut symbols: Vec<Symbol> = Vec::new();
        for order in &state.orders {
            if matches!(order.status, OrderStatus::Pending | OrderStatus::Executing)
                && !symbols.contains(&order.symbol)
            {
                symbols.push(order.symbol.clone());
            }
        }
        symbols
    }

    async fn claim_order(&self, id: Uuid, attempt_id: Uuid, now: DateTime<Utc>) -> ClaimOutcome {
        let mut state = self.state.lock().await;
        let Some(order) = state.order_mut(id) else {
            return ClaimOutcome::Lost;
        };
        if order.status != OrderStatus::Pending {
            return ClaimOutcome::Lost;
        }
        order.status = OrderStatus::Executing;
        order.attempt_id = Some(attempt_id);
        order.attempt_count += 1;
        order.last_attempt_at = Some(now);
        order.updated_at = now;
        ClaimOutcome::Claimed
    }

    async fn apply_settlement(&self, batch: &SettlementBatch) -> Result<(), SettleError> {
        let mut state = self.state.lock().await;
        let value = batch.price * batch.quantity;

        // Verify the precondition before touching anything.
        match batch.side {
            Side::Buy => {
                let portfolio = state
                    .portfolios
                    .get(&batch.agent_id)
                    .ok_or(SettleError::PortfolioNotFound)?;
                if portfolio.cash_balance < value {
                    return Err(SettleError::InsufficientCash);
                }
            }
            Side::Sell => {
                if !state.portfolios.contains_key(&batch.agent_id) {
                    return Err(SettleError::PortfolioNotFound);
                }
                let held = state
                    .holdings
                    .get(&(batch.agent_id.clone(), batch.symbol.clone()))
                    .map(|h| h.quantity)
                    .unwrap_or(0.0);
                let reserved = state.reserved_sell_quantity(
                    &batch.agent_id,
                    &batch.symbol,
                    batch.exclude_order_id,
                );
                if held - reserved < batch.quantity {
                    return Err(SettleError::InsufficientShares);
                }
            }
        }

        let now = Utc::now();
        let key = (batch.agent_id.clone(), batch.symbol.clone());
        match batch.side {
            Side::Buy => {
                let holding = state
                    .holdings
                    .entry(key)
                    .or_insert_with(|| Holding::new(batch.symbol.clone()));
                holding.apply_buy(batch.quantity, batch.price);
            }
            Side::Sell => {
                if let Some(holding) = state.holdings.get_mut(&key) {
                    holding.apply_sell(batch.quantity);
                    if holding.is_closed() {
                        state.holdings.remove(&key);
                    }
                }
            }
        }
        if let Some(portfolio) = state.portfolios.get_mut(&batch.agent_id) {
            match batch.side {
                Side::Buy => portfolio.cash_balance -= value,
                Side::Sell => portfolio.cash_balance += value,
            }
            portfolio.updated_at = now;
        }
        state.transactions.push(TransactionRecord::new(
            batch.agent_id.clone(),
            batch.symbol.clone(),
            batch.side,
            batch.quantity,
            batch.price,
            batch.market_source,
            batch.reasoning.clone(),
        ));
        Ok(())
    }

    async fn mark_filled(&self, id: Uuid, price: f64, quantity: f64) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.order_mut(id) {
            let now = Utc::now();
            order.status = OrderStatus::Filled;
            order.filled_price = Some(price);
            order.filled_at = Some(now);
            order.quantity = quantity;
            order.last_error = None;
            order.updated_at = now;
        }
    }

    async fn mark_rejected(&self, id: Uuid, reason: &str) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.order_mut(id) {
            order.status = OrderStatus::Rejected;
            order.last_error = Some(reason.to_string());
            order.updated_at = Utc::now();
        }
    }

    async fn cancel_order(&self, id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let order = state.order_mut(id).ok_or(LedgerError::OrderNotFound(id))?;
        if order.status != OrderStatus::Pending {
            return Err(LedgerError::NotPending(id));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn update_trail_watermark(&self, id: Uuid, high: Option<f64>, low: Option<f64>) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.order_mut(id) {
            if high.is_some() {
                order.trail_high_price = high;
            }
            if low.is_some() {
                order.trail_low_price = low;
            }
            order.updated_at = Utc::now();
        }
    }

    async fn set_equity(&self, agent_id: &AgentId, equity: f64) {
        let mut state = self.state.lock().await;
        if let Some(portfolio) = state.portfolios.get_mut(agent_id) {
            portfolio.equity = equity;
            portfolio.updated_at = Utc::now();
        }
    }

    async fn reclaim_stuck(&self, older_than: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut reclaimed = 0;
        for order in state.orders.iter_mut() {
            if order.status == OrderStatus::Executing
                && order.last_attempt_at.is_some_and(|at| at < older_than)
            {
                debug!("reclaiming stuck order {} on {}", order.id, order.symbol);
                order.status = OrderStatus::Pending;
                order.attempt_id = None;
                order.last_error = Some("execution_timeout".to_string());
                order.updated_at = now;
                reclaimed += 1;
            }
        }
        reclaimed
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let mut expired = 0;
        for order in state.orders.iter_mut() {
            if order.status == OrderStatus::Pending
                && order.expires_at.is_some_and(|at| at <= now)
            {
                order.status = OrderStatus::Expired;
                order.updated_at = now;
                expired += 1;
            }
        }
        expired
    }

    async fn record_attempt(&self, attempt: ExecutionAttempt) {
        self.state.lock().await.attempts.push(attempt);
    }

    async fn finish_attempt(
        &self,
        order_id: Uuid,
        attempt_id: Uuid,
        status: OrderStatus,
        error: Option<String>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(attempt) = state
            .attempts
            .iter_mut()
            .find(|a| a.order_id == order_id && a.attempt_id == attempt_id)
        {
            attempt.status = status;
            attempt.error_message = error;
        }
    }

    async fn attempts_for_order(&self, order_id: Uuid) -> Vec<ExecutionAttempt> {
        self.state
            .lock()
            .await
            .attempts
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect()
    }

    async fn transactions(&self, agent_id: &AgentId) -> Vec<TransactionRecord> {
        self.state
            .lock()
            .await
            .transactions
            .iter()
            .filter(|t| t.agent_id == *agent_id)
            .cloned()
            .collect()
    }
}
