//! Persistence layer
//!
//! Two store traits cover everything the scheduler and ingest service need.
//! `sqlite::SqliteDb` is the durable implementation; `memory::MemoryStore`
//! backs tests and dry runs.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::progress::{
    EntityRecord, GlobalPhaseRecord, PriorityClass, ProgressFilter, ProgressSummary,
};
use crate::reconcile::ConsolidatedRecord;
use chrono::{DateTime, Utc};

/// Durable per-entity and global progress
pub trait ProgressStore: Send + Sync {
    /// Entities matching `filter`, requested priority first, then by id
    fn load_entity_progress(&self, filter: &ProgressFilter) -> Result<Vec<EntityRecord>>;

    fn get_entity_progress(&self, entity_id: &str) -> Result<Option<EntityRecord>>;

    /// Insert or replace one entity's record
    fn save_entity_progress(&self, record: &EntityRecord) -> Result<()>;

    fn save_entities_progress(&self, records: &[EntityRecord]) -> Result<()> {
        for record in records {
            self.save_entity_progress(record)?;
        }
        Ok(())
    }

    /// Reset the given entities, or every entity when `None`. Returns the count.
    fn reset_entity_progress(&self, entity_ids: Option<&[String]>) -> Result<usize>;

    /// Create PENDING records for ids not yet known. Returns how many were new.
    fn register_entities(&self, entity_ids: &[String], priority: PriorityClass) -> Result<usize>;

    /// Aggregate counts, with "today" taken from `now`
    fn progress_summary(&self, now: DateTime<Utc>) -> Result<ProgressSummary>;

    fn load_global_phase(&self) -> Result<Option<GlobalPhaseRecord>>;

    fn save_global_phase(&self, record: &GlobalPhaseRecord) -> Result<()>;
}

/// Consolidated financial records, one per (entity, year)
pub trait FinancialsStore: Send + Sync {
    fn load_consolidated(&self, entity_id: &str, year: i32) -> Result<Option<ConsolidatedRecord>>;

    /// Every stored year for an entity, oldest first
    fn load_entity_financials(&self, entity_id: &str) -> Result<Vec<ConsolidatedRecord>>;

    /// Idempotent upsert by (entity, year).
    ///
    /// A field absent from `record` but present in storage is kept.
    fn upsert_consolidated(&self, record: &ConsolidatedRecord) -> Result<()>;
}

/// Everything a cycle needs from storage
pub trait Store: ProgressStore + FinancialsStore {}

impl<T: ProgressStore + FinancialsStore> Store for T {}
