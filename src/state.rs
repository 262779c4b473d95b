//! Application state management

use crate::config::IngestConfig;
use crate::db::sqlite::SqliteDb;
use crate::db::Store;
use crate::error::Result;
use crate::providers::ProviderRegistry;
use crate::reconcile::ReconcileOptions;
use crate::scheduler::universe::Universe;
use std::sync::Arc;

/// State shared by the scheduler and the ingest service
pub struct AppState {
    pub config: IngestConfig,

    /// Progress and financials storage
    pub store: Arc<dyn Store>,

    /// Data providers, highest priority first
    pub providers: ProviderRegistry,

    /// Static ticker universe, if configured
    pub universe: Option<Universe>,
}

impl AppState {
    /// Open the configured database and build the configured providers
    pub fn new(config: IngestConfig) -> Result<Self> {
        let store = Arc::new(SqliteDb::new(&config.storage.database_path)?);
        let providers = ProviderRegistry::from_config(&config.providers)?;
        let universe = match &config.storage.universe_path {
            Some(path) => Some(Universe::from_file(path)?),
            None => None,
        };

        tracing::info!(
            "Ingest state ready: database {}, {} providers",
            config.storage.database_path.display(),
            providers.len()
        );

        Ok(Self {
            config,
            store,
            providers,
            universe,
        })
    }

    /// Assemble state from already-built parts
    pub fn with_parts(config: IngestConfig, store: Arc<dyn Store>, providers: ProviderRegistry) -> Self {
        Self {
            config,
            store,
            providers,
            universe: None,
        }
    }

    pub fn with_universe(mut self, universe: Universe) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions::from(&self.config.reconcile)
    }
}
