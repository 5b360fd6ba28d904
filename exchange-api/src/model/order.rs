use crate::error::ValidationError;
use crate::model::ids::AgentId;
use crate::model::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TrailingStop,
}

/// Order lifecycle. `Pending -> Executing -> {Filled | Rejected}`,
/// `Pending -> Cancelled` (agent), `Pending -> Expired` (deadline),
/// `Executing -> Pending` (recovery-sweep timeout reclaim only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Executing,
    Filled,
    Rejected,
    Cancelled,
    Expired,
}

/// Validated order parameters as submitted by the intake boundary.
/// Each variant carries exactly the price field its type needs, so the
/// core never has to check field combinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "order_type", rename_all = "snake_case")]
pub enum OrderRequest {
    Market,
    Limit { limit_price: f64 },
    StopLoss { stop_price: f64 },
    TrailingStop { trail_percent: f64 },
}

impl OrderRequest {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderRequest::Market => OrderType::Market,
            OrderRequest::Limit { .. } => OrderType::Limit,
            OrderRequest::StopLoss { .. } => OrderType::StopLoss,
            OrderRequest::TrailingStop { .. } => OrderType::TrailingStop,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            OrderRequest::Market => Ok(()),
            OrderRequest::Limit { limit_price } if limit_price > 0.0 => Ok(()),
            OrderRequest::Limit { .. } => Err(ValidationError::InvalidPrice("limit_price")),
            OrderRequest::StopLoss { stop_price } if stop_price > 0.0 => Ok(()),
            OrderRequest::StopLoss { .. } => Err(ValidationError::InvalidPrice("stop_price")),
            OrderRequest::TrailingStop { trail_percent }
                if trail_percent > 0.0 && trail_percent < 100.0 =>
            {
                Ok(())
            }
            OrderRequest::TrailingStop { .. } => {
                Err(ValidationError::InvalidPrice("trail_percent"))
            }
        }
    }
}

/// An instruction to buy or sell, evaluated against live quotes until
/// it fills, is cancelled, or expires. Never deleted, only
/// terminal-stamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub trail_percent: Option<f64>,
    /// Trailing watermarks: best price observed since creation.
    /// Persisted only when the move exceeds the noise threshold.
    pub trail_high_price: Option<f64>,
    pub trail_low_price: Option<f64>,
    pub status: OrderStatus,
    pub attempt_id: Option<Uuid>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub reasoning: Option<String>,
    pub filled_price: Option<f64>,
    pub filled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        agent_id: AgentId,
        symbol: Symbol,
        side: Side,
        quantity: f64,
        request: OrderRequest,
        reasoning: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ValidationError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ValidationError::InvalidQuantity);
        }
        request.validate()?;

        let now = Utc::now();
        let (limit_price, stop_price, trail_percent) = match request {
            OrderRequest::Market => (None, None, None),
            OrderRequest::Limit { limit_price } => (Some(limit_price), None, None),
            OrderRequest::StopLoss { stop_price } => (None, Some(stop_price), None),
            OrderRequest::TrailingStop { trail_percent } => (None, None, Some(trail_percent)),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            agent_id,
            symbol,
            side,
            order_type: request.order_type(),
            quantity,
            limit_price,
            stop_price,
            trail_percent,
            trail_high_price: None,
            trail_low_price: None,
            status: OrderStatus::Pending,
            attempt_id: None,
            attempt_count: 0,
            last_error: None,
            reasoning,
            filled_price: None,
            filled_at: None,
            expires_at,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}
