use crate::model::ids::AgentId;
use crate::model::order::Side;
use crate::model::quote::QuoteSource;
use crate::model::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of an executed trade. Never mutated after
/// insert; the sole source of truth for realized history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub agent_id: AgentId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub market_source: QuoteSource,
    pub reasoning: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        agent_id: AgentId,
        symbol: Symbol,
        side: Side,
        quantity: f64,
        price: f64,
        market_source: QuoteSource,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            symbol,
            side,
            quantity,
            price,
            market_source,
            reasoning,
            executed_at: Utc::now(),
        }
    }
}
