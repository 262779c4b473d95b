//! In-memory provider with scripted replies, for tests

use super::types::{Facet, PartialRecord, ProviderId};
use super::DataProvider;
use crate::error::{AppError, ProviderError, Result};
use crate::reconcile::fields::{Field, FinancialFields};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fiscal year used by unscripted replies
pub const DEFAULT_YEAR: i32 = 2024;

#[derive(Debug, Clone)]
pub enum Reply {
    Records(Vec<PartialRecord>),
    Fail(ProviderError),
}

pub struct ScriptedProvider {
    id: ProviderId,
    facets: Vec<Facet>,
    latency: Mutex<Duration>,
    listing_latency: Mutex<Duration>,
    tickers: Mutex<Vec<String>>,
    queued: DashMap<(String, Facet), VecDeque<Reply>>,
    standing: Mutex<HashMap<String, Reply>>,
    calls: DashMap<String, u32>,
    total_calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(id: ProviderId, facets: &[Facet]) -> Self {
        Self {
            id,
            facets: facets.to_vec(),
            latency: Mutex::new(Duration::ZERO),
            listing_latency: Mutex::new(Duration::ZERO),
            tickers: Mutex::new(Vec::new()),
            queued: DashMap::new(),
            standing: Mutex::new(HashMap::new()),
            calls: DashMap::new(),
            total_calls: AtomicU32::new(0),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    /// Delay before `list_tickers` answers
    pub fn with_listing_latency(self, latency: Duration) -> Self {
        *self.listing_latency.lock() = latency;
        self
    }

    pub fn with_tickers(self, tickers: &[&str]) -> Self {
        *self.tickers.lock() = tickers.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Queue a one-shot reply for (entity, facet)
    pub fn push(&self, entity_id: &str, facet: Facet, reply: Reply) {
        self.queued
            .entry((entity_id.to_string(), facet))
            .or_default()
            .push_back(reply);
    }

    /// Reply used for every facet of `entity_id` once its queue is empty
    pub fn set(&self, entity_id: &str, reply: Reply) {
        self.standing.lock().insert(entity_id.to_string(), reply);
    }

    pub fn calls_for(&self, entity_id: &str) -> u32 {
        self.calls.get(entity_id).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn default_records(&self, facet: Facet) -> Vec<PartialRecord> {
        let fields = FinancialFields::default()
            .with(Field::Revenue, 1_000.0)
            .with(Field::Price, 50.0);
        vec![PartialRecord::new(self.id, facet, DEFAULT_YEAR, fields)]
    }

    fn next_reply(&self, entity_id: &str, facet: Facet) -> Reply {
        let key = (entity_id.to_string(), facet);
        if let Some(mut queue) = self.queued.get_mut(&key) {
            if let Some(reply) = queue.pop_front() {
                return reply;
            }
        }
        self.standing
            .lock()
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| Reply::Records(self.default_records(facet)))
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn facets(&self) -> &[Facet] {
        &self.facets
    }

    async fn fetch(
        &self,
        entity_id: &str,
        facet: Facet,
        cancel: &CancellationToken,
    ) -> Result<Vec<PartialRecord>> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.entry(entity_id.to_string()).or_insert(0) += 1;

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        match self.next_reply(entity_id, facet) {
            Reply::Records(mut records) => {
                for record in &mut records {
                    record.provider = self.id;
                    record.facet = facet;
                }
                Ok(records)
            }
            Reply::Fail(error) => Err(error.into()),
        }
    }

    async fn list_tickers(&self) -> Result<Vec<String>> {
        let latency = *self.listing_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(self.tickers.lock().clone())
    }
}

/// Shorthand for a transient provider failure
pub fn transient(provider: ProviderId) -> Reply {
    Reply::Fail(ProviderError::Transient {
        provider: provider.to_string(),
        message: "503 Service Unavailable".into(),
    })
}

/// Shorthand for a permanent not-found failure
pub fn not_found(provider: ProviderId, entity_id: &str) -> Reply {
    Reply::Fail(ProviderError::NotFound {
        provider: provider.to_string(),
        entity: entity_id.to_string(),
    })
}

/// One record per `(year, fields)` pair
pub fn years(provider: ProviderId, rows: Vec<(i32, FinancialFields)>) -> Reply {
    Reply::Records(
        rows.into_iter()
            .map(|(year, fields)| PartialRecord::new(provider, Facet::HistoricalStatements, year, fields))
            .collect(),
    )
}
