//! Data provider adapters module

pub mod http;
pub mod rate_limiter;
pub mod types;

#[cfg(test)]
pub mod scripted;

use crate::config::ProviderConfig;
use crate::error::Result;
use async_trait::async_trait;
use rate_limiter::RateLimiter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use types::*;

/// Provider trait that all data sources must implement
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Provider ID, which also fixes its reconciliation priority
    fn id(&self) -> ProviderId;

    /// Facets this provider can serve
    fn facets(&self) -> &[Facet];

    /// Fetch one facet for one entity.
    ///
    /// Returns the provider's sparse records, one per fiscal year. Errors map
    /// onto `ProviderError`: not-found, rate-limited, auth, transient or
    /// malformed.
    async fn fetch(
        &self,
        entity_id: &str,
        facet: Facet,
        cancel: &CancellationToken,
    ) -> Result<Vec<PartialRecord>>;

    /// Tickers this provider covers, used during discovery
    async fn list_tickers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn supports(&self, facet: Facet) -> bool {
        self.facets().contains(&facet)
    }
}

/// A provider paired with its request limiter
#[derive(Clone)]
pub struct ProviderHandle {
    pub provider: Arc<dyn DataProvider>,
    pub limiter: Arc<RateLimiter>,
}

impl ProviderHandle {
    pub fn new(provider: Arc<dyn DataProvider>, rate_per_second: u32) -> Self {
        Self {
            provider,
            limiter: Arc::new(RateLimiter::new(rate_per_second)),
        }
    }

    pub fn id(&self) -> ProviderId {
        self.provider.id()
    }

    /// Fetch through the rate limiter
    pub async fn fetch(
        &self,
        entity_id: &str,
        facet: Facet,
        cancel: &CancellationToken,
    ) -> Result<Vec<PartialRecord>> {
        self.limiter.acquire(cancel).await?;
        self.provider.fetch(entity_id, facet, cancel).await
    }
}

/// Provider registry, kept in descending priority order
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderHandle>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP providers from configuration
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let provider = http::HttpJsonProvider::from_config(config)?;
            registry.register(Arc::new(provider), config.rate_per_second);
        }
        Ok(registry)
    }

    /// Register a provider, replacing any existing one with the same id
    pub fn register(&mut self, provider: Arc<dyn DataProvider>, rate_per_second: u32) {
        let id = provider.id();
        self.providers.retain(|h| h.id() != id);
        self.providers.push(ProviderHandle::new(provider, rate_per_second));
        self.providers.sort_by_key(|h| h.id().priority());
    }

    /// Get provider by ID
    pub fn get(&self, id: ProviderId) -> Option<&ProviderHandle> {
        self.providers.iter().find(|h| h.id() == id)
    }

    /// All providers, highest priority first
    pub fn list(&self) -> &[ProviderHandle] {
        &self.providers
    }

    /// Providers able to serve `facet`, highest priority first
    pub fn for_facet(&self, facet: Facet) -> impl Iterator<Item = &ProviderHandle> {
        self.providers
            .iter()
            .filter(move |h| h.provider.supports(facet))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}
