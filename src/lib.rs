//! Fundamentals Ingest
//!
//! Resumable, time-budgeted ingestion of financial fundamentals from several
//! data providers. Each invocation runs one cycle inside a wall-clock budget,
//! persists its progress, and picks up where the previous one stopped.

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod progress;
pub mod providers;
pub mod reconcile;
pub mod scheduler;
pub mod services;
pub mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::IngestConfig;
pub use error::{AppError, Result};
pub use scheduler::{CycleOptions, CycleSummary, Scheduler};
pub use state::AppState;

/// Initialize tracing/logging; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fundamentals_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
