pub mod ids;
pub mod order;
pub mod portfolio;
pub mod quote;
pub mod symbol;
pub mod transaction;

pub use ids::*;
pub use order::*;
pub use portfolio::*;
pub use quote::*;
pub use symbol::*;
pub use transaction::*;
