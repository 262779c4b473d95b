//! Universe discovery
//!
//! The universe is the union of a static, sector-organized TOML ticker list
//! and whatever each provider reports it covers. Tickers are normalized to
//! upper case and deduplicated.

use crate::error::{AppError, Result};
use crate::executor::{ConcurrencyManager, TimeoutExecutor};
use crate::providers::{ProviderHandle, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Static universe: sector name to member tickers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a universe from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("parse universe TOML: {}", e)))
    }

    /// Get all tickers across all sectors
    pub fn all_tickers(&self) -> Vec<&str> {
        self.sectors
            .values()
            .flat_map(|tickers| tickers.iter().map(|t| t.as_str()))
            .collect()
    }

    pub fn sector_tickers(&self, sector: &str) -> Option<&[String]> {
        self.sectors.get(sector).map(|v| v.as_slice())
    }

    pub fn ticker_count(&self) -> usize {
        self.sectors.values().map(|v| v.len()).sum()
    }
}

/// Canonical ticker form; `None` for blanks
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let ticker = raw.trim().to_uppercase();
    (!ticker.is_empty()).then_some(ticker)
}

/// Merge the static universe with every provider's ticker list.
///
/// Listings run side by side and each must answer within `deadline`, so
/// discovery as a whole never takes longer than that. A provider whose list
/// cannot be fetched in time is skipped with a warning.
pub async fn discover(
    universe: Option<&Universe>,
    registry: &ProviderRegistry,
    deadline: Duration,
) -> Vec<String> {
    let mut tickers = BTreeSet::new();

    if let Some(universe) = universe {
        tickers.extend(universe.all_tickers().into_iter().filter_map(normalize_ticker));
    }

    let handles: Vec<&ProviderHandle> = registry.list().iter().collect();
    let timeout = TimeoutExecutor::new(deadline);
    let listings = ConcurrencyManager::new(handles.len().max(1))
        .execute_batch(handles.clone(), |handle| {
            let timeout = &timeout;
            async move { timeout.run(|_| handle.provider.list_tickers()).await }
        })
        .await;

    for (handle, listing) in handles.into_iter().zip(listings) {
        match listing {
            Ok(list) => {
                let before = tickers.len();
                tickers.extend(list.iter().filter_map(|t| normalize_ticker(t)));
                info!(
                    "{} listed {} tickers ({} new)",
                    handle.id(),
                    list.len(),
                    tickers.len() - before
                );
            }
            Err(e) => warn!("{} ticker listing failed: {}", handle.id(), e),
        }
    }

    tickers.into_iter().collect()
}
