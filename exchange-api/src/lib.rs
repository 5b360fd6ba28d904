pub mod calendar;
pub mod error;
pub mod events;
pub mod model;

pub use calendar::{MarketCalendar, UsEquityCalendar};
pub use error::{LedgerError, SettleError, ValidationError};
pub use events::{BroadcastSink, EventSink, MarketEvent};
pub use model::ids::AgentId;
pub use model::order::{Order, OrderRequest, OrderStatus, OrderType, Side};
pub use model::portfolio::{Holding, Portfolio};
pub use model::quote::{normalize_price, Quote, QuoteSource};
pub use model::symbol::Symbol;
pub use model::transaction::TransactionRecord;
