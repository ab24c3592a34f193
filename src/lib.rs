//! Detergent tracker library: validated settings and the usage ledger.
//! The binary entry point is src/main.rs.

pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logger;

pub use config::Settings;
pub use error::{AppError, ConfigError, LedgerError};
pub use ledger::{Ledger, StatusReport, UsageEvent, UsageSummary};
