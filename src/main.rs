use anyhow::Context;
use fundamentals_ingest::{init_tracing, AppState, CycleOptions, IngestConfig, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;

/// Cycle options from `INGEST_TARGETS` (comma separated),
/// `INGEST_FORCE_REFRESH` and `INGEST_RESET_ALL`
fn options_from_env() -> CycleOptions {
    let flag = |key: &str| {
        std::env::var(key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    };

    CycleOptions {
        target_entities: std::env::var("INGEST_TARGETS")
            .map(|v| v.split(',').map(|t| t.trim().to_string()).collect())
            .unwrap_or_default(),
        force_full_refresh: flag("INGEST_FORCE_REFRESH"),
        reset_all: flag("INGEST_RESET_ALL"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("INGEST_CONFIG").ok())
        .map(PathBuf::from);

    let config = IngestConfig::load(config_path.as_deref()).context("loading configuration")?;
    let state = AppState::new(config).context("initializing ingest state")?;
    let scheduler = Scheduler::new(Arc::new(state));

    let summary = scheduler
        .run(&options_from_env())
        .await
        .context("running ingestion cycle")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
