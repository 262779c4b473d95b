//! In-memory store

use super::{FinancialsStore, ProgressStore};
use crate::error::Result;
use crate::progress::{
    schedule_order, EntityRecord, GlobalPhaseRecord, PriorityClass, ProgressFilter,
    ProgressSummary,
};
use crate::reconcile::ConsolidatedRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

/// Non-durable store with the same semantics as the SQLite one
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: DashMap<String, EntityRecord>,
    phase: RwLock<Option<GlobalPhaseRecord>>,
    financials: DashMap<(String, i32), ConsolidatedRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn financials_count(&self) -> usize {
        self.financials.len()
    }
}

impl ProgressStore for MemoryStore {
    fn load_entity_progress(&self, filter: &ProgressFilter) -> Result<Vec<EntityRecord>> {
        let mut records: Vec<EntityRecord> = self
            .entities
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        records.sort_by(schedule_order);
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn get_entity_progress(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        Ok(self.entities.get(entity_id).map(|e| e.value().clone()))
    }

    fn save_entity_progress(&self, record: &EntityRecord) -> Result<()> {
        self.entities
            .insert(record.entity_id.clone(), record.clone());
        Ok(())
    }

    fn reset_entity_progress(&self, entity_ids: Option<&[String]>) -> Result<usize> {
        let mut count = 0;
        for mut entry in self.entities.iter_mut() {
            let selected = entity_ids
                .map(|ids| ids.contains(entry.key()))
                .unwrap_or(true);
            if selected {
                entry.value_mut().reset();
                count += 1;
            }
        }
        Ok(count)
    }

    fn register_entities(&self, entity_ids: &[String], priority: PriorityClass) -> Result<usize> {
        let mut added = 0;
        for id in entity_ids {
            self.entities.entry(id.clone()).or_insert_with(|| {
                added += 1;
                let mut record = EntityRecord::new(id);
                record.priority = priority;
                record
            });
        }
        Ok(added)
    }

    fn progress_summary(&self, now: DateTime<Utc>) -> Result<ProgressSummary> {
        let mut summary = ProgressSummary::default();
        for entry in self.entities.iter() {
            summary.add(entry.value(), now);
        }
        Ok(summary)
    }

    fn load_global_phase(&self) -> Result<Option<GlobalPhaseRecord>> {
        Ok(self.phase.read().clone())
    }

    fn save_global_phase(&self, record: &GlobalPhaseRecord) -> Result<()> {
        *self.phase.write() = Some(record.clone());
        Ok(())
    }
}

impl FinancialsStore for MemoryStore {
    fn load_consolidated(&self, entity_id: &str, year: i32) -> Result<Option<ConsolidatedRecord>> {
        Ok(self
            .financials
            .get(&(entity_id.to_string(), year))
            .map(|r| r.value().clone()))
    }

    fn load_entity_financials(&self, entity_id: &str) -> Result<Vec<ConsolidatedRecord>> {
        let mut records: Vec<ConsolidatedRecord> = self
            .financials
            .iter()
            .filter(|r| r.key().0 == entity_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.year);
        Ok(records)
    }

    fn upsert_consolidated(&self, record: &ConsolidatedRecord) -> Result<()> {
        let key = (record.entity_id.clone(), record.year);
        let mut merged = record.clone();
        if let Some(existing) = self.financials.get(&key) {
            merged.fill_missing_from(existing.value());
        }
        merged.updated_at = Some(Utc::now());
        self.financials.insert(key, merged);
        Ok(())
    }
}
