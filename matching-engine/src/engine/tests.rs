use super::*;
use crate::ledger::{ClaimOutcome, MemoryLedger};
use exchange_api::{BroadcastSink, OrderStatus};
use quote_gateway::{MockProvider, QuoteResolver, ResolverConfig};
use std::sync::Mutex;

/// Calendar gated on a single opening instant: closed strictly before
/// it, open forever after. Lets tests place orders "overnight" and
/// then ring the bell.
struct GateCalendar {
    opens_at: Mutex<DateTime<Utc>>,
}

impl GateCalendar {
    fn open() -> Self {
        Self {
            opens_at: Mutex::new(Utc::now() - chrono::Duration::days(365)),
        }
    }

    fn closed() -> Self {
        Self {
            opens_at: Mutex::new(Utc::now() + chrono::Duration::days(365)),
        }
    }

    fn open_now(&self) {
        *self.opens_at.lock().unwrap() = Utc::now();
    }
}

impl MarketCalendar for GateCalendar {
    fn is_open(&self, now: DateTime<Utc>) -> bool {
        now >= *self.opens_at.lock().unwrap()
    }

    fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let at = *self.opens_at.lock().unwrap();
        if now >= at {
            now
        } else {
            at
        }
    }
}

struct Harness {
    engine: Engine,
    ledger: Arc<MemoryLedger>,
    provider: MockProvider,
    calendar: Arc<GateCalendar>,
    events: Arc<BroadcastSink>,
}

fn create_test_engine(price: f64, open: bool) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let provider = MockProvider::fixed("primary", price);
    // Zero cache windows so every tick sees the latest scripted price.
    let resolver = Arc::new(QuoteResolver::new(
        Box::new(provider.clone()),
        Box::new(MockProvider::failing("backup")),
        ResolverConfig {
            max_age_secs: 0,
            provider_ttl_secs: 0,
            override_ttl_secs: 0,
        },
    ));
    let calendar = Arc::new(if open {
        GateCalendar::open()
    } else {
        GateCalendar::closed()
    });
    let events = Arc::new(BroadcastSink::new(64));
    let engine = Engine::new(
        Arc::clone(&ledger) as Arc<dyn LedgerStore>,
        resolver,
        Arc::clone(&events) as Arc<dyn EventSink>,
        Arc::clone(&calendar) as Arc<dyn MarketCalendar>,
        Arc::new(EngineConfig {
            signal_backoff_ms: 10,
            ..EngineConfig::default()
        }),
    );
    Harness {
        engine,
        ledger,
        provider,
        calendar,
        events,
    }
}

fn agent() -> AgentId {
    AgentId::new("agent-1")
}

fn symbol() -> Symbol {
    Symbol::new("ABC").unwrap()
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn test_limit_buy_fills_at_limit_with_price_improvement() {
    let h = create_test_engine(48.0, true);
    h.engine.register_agent(agent(), 10_000.0).await;

    let placed = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Buy,
            10.0,
            OrderRequest::Limit { limit_price: 50.0 },
            Some("dip entry".into()),
            None,
        )
        .await
        .unwrap();

    let order = h.ledger.order(placed.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_price, Some(50.0));
    assert_eq!(order.attempt_count, 1);

    approx(h.ledger.portfolio(&agent()).await.unwrap().cash_balance, 9_500.0);
    let holding = h.ledger.holding(&agent(), &symbol()).await.unwrap();
    approx(holding.quantity, 10.0);
    approx(holding.average_cost, 50.0);

    let attempts = h.ledger.attempts_for_order(placed.id).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_limit_buy_rests_until_price_reaches_limit() {
    let h = create_test_engine(60.0, true);
    h.engine.register_agent(agent(), 10_000.0).await;

    let placed = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Buy,
            10.0,
            OrderRequest::Limit { limit_price: 50.0 },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        h.ledger.order(placed.id).await.unwrap().status,
        OrderStatus::Pending
    );

    h.provider.set_price(49.0);
    let outcome = h.engine.signal(&symbol()).await;
    assert_eq!(outcome, TickOutcome::Evaluated { filled: 1, rejected: 0 });
    assert_eq!(
        h.ledger.order(placed.id).await.unwrap().filled_price,
        Some(50.0)
    );
}

#[tokio::test]
async fn test_second_buy_rejected_when_cash_runs_out() {
    let h = create_test_engine(8.0, true);
    h.engine.register_agent(agent(), 100.0).await;

    let first = h
        .engine
        .place_order(agent(), symbol(), Side::Buy, 10.0, OrderRequest::Market, None, None)
        .await
        .unwrap();
    let second = h
        .engine
        .place_order(agent(), symbol(), Side::Buy, 10.0, OrderRequest::Market, None, None)
        .await
        .unwrap();

    assert_eq!(h.ledger.order(first.id).await.unwrap().status, OrderStatus::Filled);
    let loser = h.ledger.order(second.id).await.unwrap();
    assert_eq!(loser.status, OrderStatus::Rejected);
    assert_eq!(loser.last_error.as_deref(), Some("insufficient cash"));
    approx(h.ledger.portfolio(&agent()).await.unwrap().cash_balance, 20.0);
}

#[tokio::test]
async fn test_market_order_rests_while_closed_then_fills_capped() {
    let h = create_test_engine(10.0, false);
    h.engine.register_agent(agent(), 100.0).await;

    let placed = h
        .engine
        .place_order(agent(), symbol(), Side::Buy, 20.0, OrderRequest::Market, None, None)
        .await
        .unwrap();
    assert_eq!(
        h.ledger.order(placed.id).await.unwrap().status,
        OrderStatus::Pending
    );

    h.calendar.open_now();
    let outcome = h.engine.signal(&symbol()).await;
    assert_eq!(outcome, TickOutcome::Evaluated { filled: 1, rejected: 0 });

    // Only 10 shares were affordable at the open.
    let order = h.ledger.order(placed.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    approx(order.quantity, 10.0);
    assert_eq!(order.filled_price, Some(10.0));
    approx(h.ledger.portfolio(&agent()).await.unwrap().cash_balance, 0.0);
}

#[tokio::test]
async fn test_queued_market_buy_with_no_buying_power_rejected() {
    let h = create_test_engine(10.0, false);
    h.engine.register_agent(agent(), 100.0).await;

    // A resting limit buy worth the whole balance.
    let resting = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Buy,
            20.0,
            OrderRequest::Limit { limit_price: 5.0 },
            None,
            None,
        )
        .await
        .unwrap();
    let market = h
        .engine
        .place_order(agent(), symbol(), Side::Buy, 10.0, OrderRequest::Market, None, None)
        .await
        .unwrap();

    h.calendar.open_now();
    h.engine.signal(&symbol()).await;

    let rejected = h.ledger.order(market.id).await.unwrap();
    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert_eq!(
        rejected.last_error.as_deref(),
        Some("insufficient funds to fill market order")
    );
    assert_eq!(
        h.ledger.order(resting.id).await.unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn test_trailing_stop_rides_high_then_sells() {
    let h = create_test_engine(100.0, true);
    h.engine.register_agent(agent(), 1_000.0).await;
    h.engine
        .place_order(agent(), symbol(), Side::Buy, 5.0, OrderRequest::Market, None, None)
        .await
        .unwrap();

    let trail = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Sell,
            5.0,
            OrderRequest::TrailingStop { trail_percent: 5.0 },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        h.ledger.order(trail.id).await.unwrap().trail_high_price,
        Some(100.0)
    );

    h.provider.set_price(110.0);
    h.engine.signal(&symbol()).await;
    let riding = h.ledger.order(trail.id).await.unwrap();
    assert_eq!(riding.status, OrderStatus::Pending);
    assert_eq!(riding.trail_high_price, Some(110.0));

    // Stop now sits at 104.5; 104.6 holds, 104.4 sells.
    h.provider.set_price(104.6);
    h.engine.signal(&symbol()).await;
    assert_eq!(
        h.ledger.order(trail.id).await.unwrap().status,
        OrderStatus::Pending
    );

    h.provider.set_price(104.4);
    h.engine.signal(&symbol()).await;
    let sold = h.ledger.order(trail.id).await.unwrap();
    assert_eq!(sold.status, OrderStatus::Filled);
    assert_eq!(sold.filled_price, Some(104.4));

    assert!(h.ledger.holding(&agent(), &symbol()).await.is_none());
    approx(
        h.ledger.portfolio(&agent()).await.unwrap().cash_balance,
        500.0 + 104.4 * 5.0,
    );
}

#[tokio::test]
async fn test_trailing_watermark_ignores_noise() {
    let h = create_test_engine(100.0, true);
    h.engine.register_agent(agent(), 1_000.0).await;
    h.engine
        .place_order(agent(), symbol(), Side::Buy, 1.0, OrderRequest::Market, None, None)
        .await
        .unwrap();
    let trail = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Sell,
            1.0,
            OrderRequest::TrailingStop { trail_percent: 5.0 },
            None,
            None,
        )
        .await
        .unwrap();

    // 0.3% is below the persistence threshold.
    h.provider.set_price(100.3);
    h.engine.signal(&symbol()).await;
    assert_eq!(
        h.ledger.order(trail.id).await.unwrap().trail_high_price,
        Some(100.0)
    );
}

#[tokio::test]
async fn test_oversell_rejected_at_intake() {
    let h = create_test_engine(50.0, true);
    h.engine.register_agent(agent(), 1_000.0).await;
    h.engine
        .place_order(agent(), symbol(), Side::Buy, 10.0, OrderRequest::Market, None, None)
        .await
        .unwrap();

    // 8 of the 10 shares are now reserved by a resting sell.
    h.engine
        .place_order(
            agent(),
            symbol(),
            Side::Sell,
            8.0,
            OrderRequest::Limit { limit_price: 999.0 },
            None,
            None,
        )
        .await
        .unwrap();

    let err = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Sell,
            5.0,
            OrderRequest::Limit { limit_price: 999.0 },
            None,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err, PlaceError::InsufficientShares);

    // The unreserved remainder is still sellable.
    assert!(h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Sell,
            2.0,
            OrderRequest::Limit { limit_price: 999.0 },
            None,
            None,
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cancel_only_from_pending() {
    let h = create_test_engine(10.0, false);
    h.engine.register_agent(agent(), 1_000.0).await;
    let resting = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Buy,
            1.0,
            OrderRequest::Limit { limit_price: 5.0 },
            None,
            None,
        )
        .await
        .unwrap();

    h.engine.cancel_order(resting.id).await.unwrap();
    assert_eq!(
        h.ledger.order(resting.id).await.unwrap().status,
        OrderStatus::Cancelled
    );
    assert_eq!(
        h.engine.cancel_order(resting.id).await.unwrap_err(),
        LedgerError::NotPending(resting.id)
    );
}

#[tokio::test]
async fn test_recovery_reclaims_stuck_order_and_refires() {
    let h = create_test_engine(10.0, true);
    h.engine.register_agent(agent(), 1_000.0).await;

    let order = Order::new(
        agent(),
        symbol(),
        Side::Buy,
        5.0,
        OrderRequest::Market,
        None,
        None,
    )
    .unwrap();
    let id = order.id;
    h.ledger.insert_order(order).await;

    // Simulate a tick that claimed six minutes ago and died.
    let stale_claim = Utc::now() - chrono::Duration::minutes(6);
    assert_eq!(
        h.ledger.claim_order(id, Uuid::new_v4(), stale_claim).await,
        ClaimOutcome::Claimed
    );

    let report = h.engine.recovery_sweep().run_once().await;
    assert_eq!(report.reclaimed, 1);
    assert!(report.signalled >= 1);

    // Reclaim put it back to pending; the nudge then filled it on a
    // second attempt.
    let recovered = h.ledger.order(id).await.unwrap();
    assert_eq!(recovered.status, OrderStatus::Filled);
    assert_eq!(recovered.attempt_count, 2);
}

#[tokio::test]
async fn test_sweep_expires_past_deadline_orders() {
    let h = create_test_engine(10.0, false);
    h.engine.register_agent(agent(), 1_000.0).await;
    let placed = h
        .engine
        .place_order(
            agent(),
            symbol(),
            Side::Buy,
            1.0,
            OrderRequest::Limit { limit_price: 5.0 },
            None,
            Some(Utc::now() - chrono::Duration::minutes(1)),
        )
        .await
        .unwrap();

    let report = h.engine.recovery_sweep().run_once().await;
    assert_eq!(report.expired, 1);
    assert_eq!(report.signalled, 0); // market closed, no nudges
    assert_eq!(
        h.ledger.order(placed.id).await.unwrap().status,
        OrderStatus::Expired
    );
}

#[tokio::test]
async fn test_lifecycle_events_are_published_in_order() {
    let h = create_test_engine(10.0, true);
    h.engine.register_agent(agent(), 1_000.0).await;
    let mut rx = h.events.subscribe();

    h.engine
        .place_order(agent(), symbol(), Side::Buy, 2.0, OrderRequest::Market, None, None)
        .await
        .unwrap();

    let kinds: Vec<String> = vec![
        rx.recv().await.unwrap().event_type,
        rx.recv().await.unwrap().event_type,
        rx.recv().await.unwrap().event_type,
    ];
    assert_eq!(kinds, ["order_created", "trade", "order_filled"]);
}

#[tokio::test]
async fn test_equity_marks_holdings_at_live_quotes() {
    let h = create_test_engine(10.0, true);
    h.engine.register_agent(agent(), 1_000.0).await;
    h.engine
        .place_order(agent(), symbol(), Side::Buy, 10.0, OrderRequest::Market, None, None)
        .await
        .unwrap();
    approx(h.ledger.portfolio(&agent()).await.unwrap().equity, 1_000.0);

    // Market moves to 12; selling half refreshes the mark.
    h.provider.set_price(12.0);
    h.engine
        .place_order(agent(), symbol(), Side::Sell, 5.0, OrderRequest::Market, None, None)
        .await
        .unwrap();
    let portfolio = h.ledger.portfolio(&agent()).await.unwrap();
    approx(portfolio.cash_balance, 960.0);
    approx(portfolio.equity, 1_020.0);
}
