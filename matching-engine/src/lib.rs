pub mod config;
pub mod engine;
pub mod io;
pub mod ledger;
pub mod recovery;
pub mod scheduler;
pub mod settlement;

pub use config::EngineConfig;
pub use engine::{Engine, PlaceError};
pub use ledger::{LedgerStore, MemoryLedger};
pub use recovery::{RecoverySweep, SweepReport};
pub use scheduler::{SchedulerRegistry, SymbolScheduler, TickOutcome};
pub use settlement::SettlementEngine;
