//! Ingestion configuration
//!
//! Loaded from a TOML file where every key has a default, then overridden by
//! `INGEST_*` environment variables so a hosting environment can tune a single
//! invocation without shipping a new file.

use crate::error::{AppError, Result};
use crate::providers::types::{Facet, ProviderId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub scheduling: SchedulingConfig,
    pub retry: RetryConfig,
    pub errors: ErrorPolicyConfig,
    pub reconcile: ReconcileConfig,
    pub storage: StorageConfig,
    pub providers: Vec<ProviderConfig>,
}

/// Time budget and batch sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Wall-clock budget for one invocation
    pub budget_ms: u64,
    /// Reserved at the end of the budget for bookkeeping
    pub safety_margin_ms: u64,
    /// Amortized time one entity is expected to take
    pub per_item_estimate_ms: u64,
    /// Hard deadline for one entity's fetch-and-reconcile task
    pub per_item_timeout_ms: u64,
    pub max_batch_size: usize,
    pub max_concurrency: usize,
    /// PROCESSING entities untouched for longer than this are reclaimed
    pub staleness_secs: u64,
    /// Re-run discovery when the last one is older than this
    pub discovery_interval_hours: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            budget_ms: 25_000,
            safety_margin_ms: 1_000,
            per_item_estimate_ms: 2_000,
            per_item_timeout_ms: 8_000,
            max_batch_size: 25,
            max_concurrency: 5,
            staleness_secs: 600,
            discovery_interval_hours: 24 * 7,
        }
    }
}

impl SchedulingConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }

    pub fn per_item_estimate(&self) -> Duration {
        Duration::from_millis(self.per_item_estimate_ms)
    }

    pub fn per_item_timeout(&self) -> Duration {
        Duration::from_millis(self.per_item_timeout_ms)
    }

    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_secs as i64)
    }

    pub fn discovery_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.discovery_interval_hours as i64)
    }
}

/// Retry policy for a single entity task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            jitter: true,
        }
    }
}

/// When failing entities stop being scheduled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ErrorPolicyConfig {
    /// Consecutive failures that move an entity to ERROR
    pub max_errors: u32,
    /// Entities above this count are never scheduled, even with errors included
    pub error_ceiling: u32,
    /// Leave ERROR entities out of normal scheduling
    pub exclude_errors: bool,
}

impl Default for ErrorPolicyConfig {
    fn default() -> Self {
        Self {
            max_errors: 3,
            error_ceiling: 10,
            exclude_errors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Market cap / enterprise value at or below this are placeholders
    pub min_large_magnitude: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_large_magnitude: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    /// Optional static universe (TOML, sector -> tickers)
    pub universe_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fundamentals.db"),
            universe_path: None,
        }
    }
}

/// One HTTP data provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub id: ProviderId,
    /// URL template with `{ticker}` and `{facet}` placeholders
    pub url_template: String,
    /// Endpoint returning the provider's ticker list, used during discovery
    #[serde(default)]
    pub tickers_url: Option<String>,
    /// Environment variable holding the API key, sent as a bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub facets: Vec<Facet>,
}

fn default_rate_per_second() -> u32 {
    5
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig::default(),
            retry: RetryConfig::default(),
            errors: ErrorPolicyConfig::default(),
            reconcile: ReconcileConfig::default(),
            storage: StorageConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Load a configuration file, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Invalid config: {}", e)))
    }

    /// Apply `INGEST_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, value)))
        }

        if let Some(v) = lookup("INGEST_BUDGET_MS") {
            self.scheduling.budget_ms = parse("INGEST_BUDGET_MS", v)?;
        }
        if let Some(v) = lookup("INGEST_PER_ITEM_ESTIMATE_MS") {
            self.scheduling.per_item_estimate_ms = parse("INGEST_PER_ITEM_ESTIMATE_MS", v)?;
        }
        if let Some(v) = lookup("INGEST_PER_ITEM_TIMEOUT_MS") {
            self.scheduling.per_item_timeout_ms = parse("INGEST_PER_ITEM_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("INGEST_MAX_BATCH_SIZE") {
            self.scheduling.max_batch_size = parse("INGEST_MAX_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("INGEST_MAX_CONCURRENCY") {
            self.scheduling.max_concurrency = parse("INGEST_MAX_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("INGEST_STALENESS_SECS") {
            self.scheduling.staleness_secs = parse("INGEST_STALENESS_SECS", v)?;
        }
        if let Some(v) = lookup("INGEST_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse("INGEST_RETRY_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("INGEST_MAX_ERRORS") {
            self.errors.max_errors = parse("INGEST_MAX_ERRORS", v)?;
        }
        if let Some(v) = lookup("INGEST_INCLUDE_ERRORS") {
            let include: bool = parse("INGEST_INCLUDE_ERRORS", v)?;
            self.errors.exclude_errors = !include;
        }
        if let Some(v) = lookup("INGEST_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("INGEST_UNIVERSE_PATH") {
            self.storage.universe_path = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Reject settings the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduling;
        if s.budget_ms == 0 {
            return Err(AppError::Config("budget_ms must be positive".to_string()));
        }
        if s.per_item_estimate_ms == 0 {
            return Err(AppError::Config(
                "per_item_estimate_ms must be positive".to_string(),
            ));
        }
        if s.per_item_timeout_ms == 0 {
            return Err(AppError::Config(
                "per_item_timeout_ms must be positive".to_string(),
            ));
        }
        if s.max_batch_size == 0 || s.max_concurrency == 0 {
            return Err(AppError::Config(
                "max_batch_size and max_concurrency must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::Config("retry.max_attempts must be positive".to_string()));
        }
        if self.errors.max_errors == 0 {
            return Err(AppError::Config("errors.max_errors must be positive".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id) {
                return Err(AppError::Config(format!(
                    "Provider '{}' is configured twice",
                    provider.id
                )));
            }
            if provider.rate_per_second == 0 {
                return Err(AppError::Config(format!(
                    "Provider '{}' needs a positive rate_per_second",
                    provider.id
                )));
            }
        }

        Ok(())
    }
}
