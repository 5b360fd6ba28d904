use crate::model::ids::AgentId;
use thiserror::Error;
use uuid::Uuid;

/// Boundary validation failures. These never reach the matching core;
/// a request that fails validation is rejected before an order exists.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("symbol is invalid: {0:?}")]
    InvalidSymbol(String),
    #[error("quantity must be a positive number")]
    InvalidQuantity,
    #[error("{0} must be a positive number")]
    InvalidPrice(&'static str),
}

/// Data-not-found and lost-conditional-update failures from the ledger.
/// Surfaced to the caller, never retried automatically.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("portfolio not found for agent {0}")]
    PortfolioNotFound(AgentId),
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("order {0} is not pending")]
    NotPending(Uuid),
}

/// Business-rule settlement rejections. These terminate the order as
/// `rejected` with the reason stored in `last_error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettleError {
    #[error("portfolio not found")]
    PortfolioNotFound,
    #[error("insufficient cash")]
    InsufficientCash,
    #[error("insufficient shares (some are reserved in pending orders)")]
    InsufficientShares,
}
