use crate::config::EngineConfig;
use crate::ledger::LedgerStore;
use crate::recovery::RecoverySweep;
use crate::scheduler::{SchedulerRegistry, TickOutcome};
use crate::settlement::SettlementEngine;
use chrono::{DateTime, Utc};
use exchange_api::{
    AgentId, EventSink, LedgerError, MarketCalendar, MarketEvent, Order, OrderRequest, Portfolio,
    Side, Symbol, ValidationError,
};
use log::info;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Why an order was refused at intake, before it ever existed in the
/// ledger.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("insufficient shares (some are reserved in pending orders)")]
    InsufficientShares,
}

/// The public face of the matching core: order intake, cancellation,
/// and ownership of the per-symbol actors and the recovery sweep.
pub struct Engine {
    ledger: Arc<dyn LedgerStore>,
    settlement: Arc<SettlementEngine>,
    registry: Arc<SchedulerRegistry>,
    events: Arc<dyn EventSink>,
    calendar: Arc<dyn MarketCalendar>,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        resolver: Arc<quote_gateway::QuoteResolver>,
        events: Arc<dyn EventSink>,
        calendar: Arc<dyn MarketCalendar>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let settlement = Arc::new(SettlementEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&resolver),
            Arc::clone(&events),
        ));
        let registry = Arc::new(SchedulerRegistry::new(
            Arc::clone(&ledger),
            resolver,
            Arc::clone(&settlement),
            Arc::clone(&events),
            Arc::clone(&calendar),
            Arc::clone(&config),
        ));
        Self {
            ledger,
            settlement,
            registry,
            events,
            calendar,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<SchedulerRegistry> {
        &self.registry
    }

    pub fn settlement(&self) -> &Arc<SettlementEngine> {
        &self.settlement
    }

    pub async fn register_agent(&self, agent_id: AgentId, initial_cash: f64) -> Portfolio {
        let portfolio = Portfolio::new(agent_id, initial_cash);
        self.ledger.upsert_portfolio(portfolio.clone()).await;
        portfolio
    }

    /// Validate, persist, announce, and immediately signal the
    /// symbol's actor. An order placed while the market is closed
    /// rests as pending until the next open.
    #[allow(clippy::too_many_arguments)]
    pub async fn place_order(
        &self,
        agent_id: AgentId,
        symbol: Symbol,
        side: Side,
        quantity: f64,
        request: OrderRequest,
        reasoning: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Order, PlaceError> {
        let order = Order::new(agent_id, symbol, side, quantity, request, reasoning, expires_at)?;

        if order.side == Side::Sell {
            let held = self
                .ledger
                .holding(&order.agent_id, &order.symbol)
                .await
                .map(|h| h.quantity)
                .unwrap_or(0.0);
            let reserved = self
                .ledger
                .reserved_sell_quantity(&order.agent_id, &order.symbol, None)
                .await;
            if held - reserved < order.quantity {
                return Err(PlaceError::InsufficientShares);
            }
        }

        self.ledger.insert_order(order.clone()).await;
        info!(
            "accepted {:?} {:?} {} x{} from {}",
            order.order_type, order.side, order.symbol, order.quantity, order.agent_id
        );
        self.events
            .publish(MarketEvent::new(
                "order_created",
                order.agent_id.as_str(),
                json!({
                    "order_id": order.id,
                    "symbol": order.symbol.as_str(),
                    "side": order.side,
                    "order_type": order.order_type,
                    "quantity": order.quantity,
                }),
            ))
            .await;

        self.registry.signal(&order.symbol).await;
        Ok(order)
    }

    /// Agent-initiated cancel. Only a pending order can be cancelled;
    /// an executing one is past the point of no return.
    pub async fn cancel_order(&self, id: Uuid) -> Result<(), LedgerError> {
        self.ledger.cancel_order(id).await?;
        if let Some(order) = self.ledger.order(id).await {
            self.events
                .publish(MarketEvent::new(
                    "order_cancelled",
                    order.agent_id.as_str(),
                    json!({ "order_id": id, "symbol": order.symbol.as_str() }),
                ))
                .await;
        }
        Ok(())
    }

    pub async fn signal(&self, symbol: &Symbol) -> TickOutcome {
        self.registry.signal(symbol).await
    }

    pub fn recovery_sweep(&self) -> RecoverySweep {
        RecoverySweep::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.registry),
            Arc::clone(&self.calendar),
            Arc::clone(&self.config),
        )
    }
}

#[cfg(test)]
mod tests;
