mod registry;

pub use registry::SchedulerRegistry;

use crate::config::EngineConfig;
use crate::ledger::{ClaimOutcome, ExecutionAttempt, LedgerStore};
use crate::settlement::SettlementEngine;
use chrono::Utc;
use exchange_api::{
    EventSink, MarketCalendar, MarketEvent, Order, OrderStatus, OrderType, Side, Symbol,
};
use log::{debug, info, warn};
use quote_gateway::{QuoteResolver, ResolveOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// What a tick did. `Busy` means another tick owned the symbol and
/// this one did no work at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Busy,
    /// No pending orders; the actor went dormant.
    Idle,
    MarketClosed,
    Evaluated { filled: usize, rejected: usize },
}

struct WatermarkUpdate {
    high: Option<f64>,
    low: Option<f64>,
    persist: bool,
}

struct Evaluation {
    execution_price: Option<f64>,
    watermark: Option<WatermarkUpdate>,
}

/// Decide whether one order triggers at the current price, and how its
/// trailing watermark moves. Trailing triggers are computed against the
/// freshly advanced watermark, persisted or not.
fn evaluate(order: &Order, price: f64, persist_threshold: f64) -> Evaluation {
    match order.order_type {
        OrderType::Market => Evaluation {
            execution_price: Some(price),
            watermark: None,
        },
        OrderType::Limit => {
            let limit = order.limit_price.unwrap_or(0.0);
            let triggered = match order.side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            };
            // Limit fills always execute at the limit price.
            Evaluation {
                execution_price: triggered.then_some(limit),
                watermark: None,
            }
        }
        OrderType::StopLoss => {
            let stop = order.stop_price.unwrap_or(0.0);
            let triggered = match order.side {
                Side::Buy => price >= stop,
                Side::Sell => price <= stop,
            };
            Evaluation {
                execution_price: triggered.then_some(price),
                watermark: None,
            }
        }
        OrderType::TrailingStop => {
            let pct = order.trail_percent.unwrap_or(0.0);
            match order.side {
                Side::Sell => {
                    let high = match order.trail_high_price {
                        Some(prev) => prev.max(price),
                        None => price,
                    };
                    let persist = match order.trail_high_price {
                        None => true,
                        Some(prev) => prev > 0.0 && (high - prev) / prev > persist_threshold,
                    };
                    let moved = order.trail_high_price.map_or(true, |prev| high > prev);
                    let stop = high * (1.0 - pct / 100.0);
                    Evaluation {
                        execution_price: (price <= stop).then_some(price),
                        watermark: moved.then_some(WatermarkUpdate {
                            high: Some(high),
                            low: None,
                            persist,
                        }),
                    }
                }
                Side::Buy => {
                    let low = match order.trail_low_price {
                        Some(prev) => prev.min(price),
                        None => price,
                    };
                    let persist = match order.trail_low_price {
                        None => true,
                        Some(prev) => prev > 0.0 && (prev - low) / prev > persist_threshold,
                    };
                    let moved = order.trail_low_price.map_or(true, |prev| low < prev);
                    let stop = low * (1.0 + pct / 100.0);
                    Evaluation {
                        execution_price: (price >= stop).then_some(price),
                        watermark: moved.then_some(WatermarkUpdate {
                            high: None,
                            low: Some(low),
                            persist,
                        }),
                    }
                }
            }
        }
    }
}

fn jittered(base_ms: u64, jitter: f64) -> Duration {
    let factor = 1.0 + jitter * (rand::random::<f64>() * 2.0 - 1.0);
    Duration::from_millis((base_ms as f64 * factor).max(0.0) as u64)
}

/// One actor per symbol. All evaluation for the symbol funnels through
/// `tick`, and the busy lock makes overlapping ticks impossible, so
/// orders on one symbol are only ever processed single-file.
pub struct SymbolScheduler {
    symbol: Symbol,
    ledger: Arc<dyn LedgerStore>,
    resolver: Arc<QuoteResolver>,
    settlement: Arc<SettlementEngine>,
    events: Arc<dyn EventSink>,
    calendar: Arc<dyn MarketCalendar>,
    config: Arc<EngineConfig>,
    busy: Mutex<()>,
    wake: Notify,
    deadline: Mutex<Option<Instant>>,
}

impl SymbolScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        ledger: Arc<dyn LedgerStore>,
        resolver: Arc<QuoteResolver>,
        settlement: Arc<SettlementEngine>,
        events: Arc<dyn EventSink>,
        calendar: Arc<dyn MarketCalendar>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            symbol,
            ledger,
            resolver,
            settlement,
            events,
            calendar,
            config,
            busy: Mutex::new(()),
            wake: Notify::new(),
            deadline: Mutex::new(None),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Background wake loop. Dormant until a deadline is set, then
    /// ticks once when it elapses.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let deadline = *scheduler.deadline.lock().await;
                match deadline {
                    Some(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {
                                let _ = scheduler.deadline.lock().await.take();
                                scheduler.tick().await;
                            }
                            _ = scheduler.wake.notified() => {}
                        }
                    }
                    None => scheduler.wake.notified().await,
                }
            }
        })
    }

    async fn set_deadline(&self, delay: Option<Duration>) {
        *self.deadline.lock().await = delay.map(|d| Instant::now() + d);
        self.wake.notify_one();
    }

    /// Evaluate every pending order for this symbol against one fresh
    /// quote, then re-arm the wake timer. Returns `Busy` without
    /// touching anything if a tick is already in flight.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_busy) = self.busy.try_lock() else {
            return TickOutcome::Busy;
        };

        let pending = self.ledger.pending_orders_for_symbol(&self.symbol).await;
        if pending.is_empty() {
            self.set_deadline(None).await;
            return TickOutcome::Idle;
        }

        let now = Utc::now();
        if !self.calendar.is_open(now) {
            debug!("market closed; parking {} until next open", self.symbol);
            self.schedule_next().await;
            return TickOutcome::MarketClosed;
        }

        let quote = self
            .resolver
            .resolve(&self.symbol, ResolveOptions::default())
            .await;
        let mut filled = 0;
        let mut rejected = 0;

        for order in pending {
            let evaluation = evaluate(&order, quote.price, self.config.trail_persist_threshold);
            if let Some(update) = evaluation.watermark {
                if update.persist {
                    self.ledger
                        .update_trail_watermark(order.id, update.high, update.low)
                        .await;
                }
            }
            let Some(execution_price) = evaluation.execution_price else {
                continue;
            };

            let mut quantity = order.quantity;
            if order.order_type == OrderType::Market
                && order.side == Side::Buy
                && !self.calendar.is_open(order.created_at)
            {
                // Queued overnight; buying power may have moved since.
                quantity = self.capped_buy_quantity(&order, quote.price).await;
            }

            let attempt_id = Uuid::new_v4();
            if self.ledger.claim_order(order.id, attempt_id, Utc::now()).await == ClaimOutcome::Lost
            {
                // Raced with another actor; the winner owns the order.
                continue;
            }
            self.ledger
                .record_attempt(ExecutionAttempt {
                    order_id: order.id,
                    attempt_id,
                    status: OrderStatus::Executing,
                    quote_price: quote.price,
                    market_source: quote.source,
                    error_message: None,
                    created_at: Utc::now(),
                })
                .await;

            if quantity <= f64::EPSILON {
                let reason = "insufficient funds to fill market order";
                self.reject(&order, attempt_id, reason).await;
                rejected += 1;
                continue;
            }

            match self
                .settlement
                .settle(&order, quantity, execution_price, quote.source)
                .await
            {
                Ok(()) => {
                    self.ledger.mark_filled(order.id, execution_price, quantity).await;
                    self.ledger
                        .finish_attempt(order.id, attempt_id, OrderStatus::Filled, None)
                        .await;
                    info!(
                        "filled order {} on {} at {execution_price}",
                        order.id, self.symbol
                    );
                    self.events
                        .publish(MarketEvent::new(
                            "order_filled",
                            order.agent_id.as_str(),
                            json!({
                                "order_id": order.id,
                                "symbol": self.symbol.as_str(),
                                "price": execution_price,
                                "quantity": quantity,
                            }),
                        ))
                        .await;
                    filled += 1;
                }
                Err(err) => {
                    self.reject(&order, attempt_id, &err.to_string()).await;
                    rejected += 1;
                }
            }
        }

        self.schedule_next().await;
        TickOutcome::Evaluated { filled, rejected }
    }

    async fn reject(&self, order: &Order, attempt_id: Uuid, reason: &str) {
        warn!("rejecting order {} on {}: {reason}", order.id, self.symbol);
        self.ledger.mark_rejected(order.id, reason).await;
        self.ledger
            .finish_attempt(
                order.id,
                attempt_id,
                OrderStatus::Rejected,
                Some(reason.to_string()),
            )
            .await;
        self.events
            .publish(MarketEvent::new(
                "order_rejected",
                order.agent_id.as_str(),
                json!({
                    "order_id": order.id,
                    "symbol": self.symbol.as_str(),
                    "reason": reason,
                }),
            ))
            .await;
    }

    /// Remaining buying power for a queued market buy: cash minus the
    /// value of the agent's other open buys, each at its limit price or
    /// the current quote when unpriced. The result caps the fill size,
    /// possibly to zero.
    async fn capped_buy_quantity(&self, order: &Order, quote_price: f64) -> f64 {
        let Some(portfolio) = self.ledger.portfolio(&order.agent_id).await else {
            return 0.0;
        };
        let mut reserved = 0.0;
        for other in self.ledger.open_buy_orders(&order.agent_id, order.id).await {
            let price = match other.limit_price {
                Some(limit) => limit,
                None if other.symbol == self.symbol => quote_price,
                None => {
                    self.resolver
                        .resolve(&other.symbol, ResolveOptions::default())
                        .await
                        .price
                }
            };
            reserved += price * other.quantity;
        }

        let available = portfolio.cash_balance - reserved;
        if quote_price <= 0.0 || available <= 0.0 {
            return 0.0;
        }
        let affordable = available / quote_price;
        if affordable >= order.quantity {
            order.quantity
        } else {
            // Round down so the capped cost never exceeds available cash.
            (affordable * 1e6).floor() / 1e6
        }
    }

    /// Re-arm the wake timer from current state: dormant with nothing
    /// pending, next-open plus a buffer while closed, otherwise the
    /// jittered cadence (tight when a trailing stop is resting).
    async fn schedule_next(&self) {
        let pending = self.ledger.pending_orders_for_symbol(&self.symbol).await;
        if pending.is_empty() {
            self.set_deadline(None).await;
            return;
        }
        let now = Utc::now();
        let delay = if !self.calendar.is_open(now) {
            let until_open = (self.calendar.next_open(now) - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            until_open + Duration::from_secs(self.config.open_buffer_secs)
        } else {
            let base = if pending
                .iter()
                .any(|o| o.order_type == OrderType::TrailingStop)
            {
                self.config.trailing_cadence_ms
            } else {
                self.config.base_cadence_ms
            };
            jittered(base, self.config.wake_jitter)
        };
        self.set_deadline(Some(delay)).await;
    }
}
