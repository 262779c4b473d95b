//! Scheduler module
//!
//! Runs time-budgeted ingestion cycles:
//! - Universe discovery (static TOML universe plus provider ticker lists)
//! - Budget accounting and batch sizing
//! - Global phase transitions
//! - The batch loop itself

pub mod budget;
pub mod cycle;
pub mod phase;
pub mod universe;

pub use budget::{BatchLimits, BudgetTracker};
pub use cycle::{CycleOptions, CycleSummary, Scheduler};
pub use universe::Universe;
