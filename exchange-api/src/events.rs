use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Structured notification emitted on order creation, fills, and
/// rejections. `room` is the delivery scope (usually the agent id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub event_type: String,
    pub room: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl MarketEvent {
    pub fn new(
        event_type: impl Into<String>,
        room: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            room: room.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Best-effort event delivery. The core guarantees emission is
/// attempted; it never waits on or fails because of subscribers.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: MarketEvent);
}

/// In-process fan-out over a tokio broadcast channel. Lagging or
/// absent subscribers drop events silently.
pub struct BroadcastSink {
    tx: broadcast::Sender<MarketEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: MarketEvent) {
        // Err means no live receivers, which is fine.
        let _ = self.tx.send(event);
    }
}

/// Sink that drops everything. Useful when the caller has no
/// subscribers to serve.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: MarketEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();

        sink.publish(MarketEvent::new("order_filled", "agent-1", json!({ "qty": 10 })))
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "order_filled");
        assert_eq!(event.room, "agent-1");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(8);
        sink.publish(MarketEvent::new("trade", "nobody", json!({}))).await;
    }
}
