use crate::ledger::{LedgerStore, SettlementBatch};
use exchange_api::{AgentId, EventSink, MarketEvent, Order, QuoteSource, SettleError};
use futures::future::join_all;
use log::info;
use quote_gateway::{QuoteResolver, ResolveOptions};
use serde_json::json;
use std::sync::Arc;

/// Applies fills to the ledger and keeps mark-to-market equity
/// current. The atomicity lives in the ledger; this layer sequences
/// the batch, the equity refresh, and the trade event.
pub struct SettlementEngine {
    ledger: Arc<dyn LedgerStore>,
    resolver: Arc<QuoteResolver>,
    events: Arc<dyn EventSink>,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        resolver: Arc<QuoteResolver>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            events,
        }
    }

    /// Settle one fill. `quantity` can be below the order's requested
    /// size when buying power capped it. A `SettleError` means nothing
    /// was written and the order should be rejected with the reason.
    pub async fn settle(
        &self,
        order: &Order,
        quantity: f64,
        price: f64,
        source: QuoteSource,
    ) -> Result<(), SettleError> {
        let batch = SettlementBatch {
            agent_id: order.agent_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            market_source: source,
            reasoning: order.reasoning.clone(),
            exclude_order_id: Some(order.id),
        };
        self.ledger.apply_settlement(&batch).await?;

        info!(
            "settled {:?} {} x{} at {} for {}",
            order.side, order.symbol, quantity, price, order.agent_id
        );

        self.refresh_equity(&order.agent_id).await;

        self.events
            .publish(MarketEvent::new(
                "trade",
                order.agent_id.as_str(),
                json!({
                    "order_id": order.id,
                    "symbol": order.symbol.as_str(),
                    "side": order.side,
                    "quantity": quantity,
                    "price": price,
                    "source": source,
                }),
            ))
            .await;
        Ok(())
    }

    /// Recompute equity as cash plus the marked value of every
    /// holding. Quotes resolve concurrently; a degraded quote still
    /// yields a usable mark.
    pub async fn refresh_equity(&self, agent_id: &AgentId) {
        let Some(portfolio) = self.ledger.portfolio(agent_id).await else {
            return;
        };
        let holdings = self.ledger.holdings(agent_id).await;

        let quotes = join_all(holdings.iter().map(|h| {
            let symbol = h.symbol.clone();
            async move { self.resolver.resolve(&symbol, ResolveOptions::default()).await }
        }))
        .await;

        let positions: f64 = holdings
            .iter()
            .zip(quotes.iter())
            .map(|(h, q)| h.quantity * q.price)
            .sum();
        self.ledger
            .set_equity(agent_id, portfolio.cash_balance + positions)
            .await;
    }
}
