//! Progress domain types
//!
//! Per-entity records live in [`entity`]; this module holds the singleton
//! global phase record and the aggregate views the scheduler reads.

pub mod entity;

pub use entity::{EntityRecord, EntityStatus, FacetFlags, PriorityClass};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overall pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Discovering,
    ProcessingHistorical,
    ProcessingTtm,
    Completed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Discovering => "DISCOVERING",
            Phase::ProcessingHistorical => "PROCESSING_HISTORICAL",
            Phase::ProcessingTtm => "PROCESSING_TTM",
            Phase::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DISCOVERING" => Ok(Phase::Discovering),
            "PROCESSING_HISTORICAL" => Ok(Phase::ProcessingHistorical),
            "PROCESSING_TTM" => Ok(Phase::ProcessingTtm),
            "COMPLETED" => Ok(Phase::Completed),
            _ => Err(format!("unknown phase: {}", s)),
        }
    }
}

/// Singleton record describing where the whole pipeline stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPhaseRecord {
    pub phase: Phase,
    /// Last entity id fully processed in the current phase
    pub cursor: Option<String>,
    pub total_entities: u64,
    pub entities_with_history: u64,
    pub entities_updated_today: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub discovered_at: Option<DateTime<Utc>>,
}

impl Default for GlobalPhaseRecord {
    fn default() -> Self {
        Self {
            phase: Phase::Discovering,
            cursor: None,
            total_entities: 0,
            entities_with_history: 0,
            entities_updated_today: 0,
            last_run_at: None,
            discovered_at: None,
        }
    }
}

/// Aggregate counts over every entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub errored: u64,
    /// Non-ERROR entities holding historical statements
    pub with_history: u64,
    /// Non-ERROR entities whose TTM facet was refreshed today (UTC)
    pub updated_today: u64,
}

impl ProgressSummary {
    /// Entities the scheduler still considers part of the universe
    pub fn schedulable(&self) -> u64 {
        self.total - self.errored
    }

    /// Fold one entity into the counts
    pub fn add(&mut self, entity: &EntityRecord, now: DateTime<Utc>) {
        self.total += 1;
        match entity.status {
            EntityStatus::Pending => self.pending += 1,
            EntityStatus::Processing => self.processing += 1,
            EntityStatus::Completed => self.completed += 1,
            EntityStatus::Error => {
                self.errored += 1;
                return;
            }
        }
        if entity.facets.historical_statements {
            self.with_history += 1;
        }
        if entity.ttm_current(now) {
            self.updated_today += 1;
        }
    }

    pub fn from_entities<'a, I>(entities: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a EntityRecord>,
    {
        let mut summary = Self::default();
        for entity in entities {
            summary.add(entity, now);
        }
        summary
    }
}

/// Selection criteria for loading entity progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressFilter {
    /// Restrict to these statuses; empty means any
    pub statuses: Vec<EntityStatus>,
    /// Restrict to these ids
    pub entity_ids: Option<Vec<String>>,
    /// Skip entities whose error count exceeds this
    pub max_error_count: Option<u32>,
    pub limit: Option<usize>,
}

impl ProgressFilter {
    /// Entities the scheduler may claim next
    pub fn eligible(include_errors: bool, error_ceiling: u32, limit: usize) -> Self {
        let mut statuses = vec![EntityStatus::Pending];
        if include_errors {
            statuses.push(EntityStatus::Error);
        }
        Self {
            statuses,
            entity_ids: None,
            max_error_count: Some(error_ceiling),
            limit: Some(limit),
        }
    }

    pub fn with_status(status: EntityStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Self::default()
        }
    }

    pub fn matches(&self, entity: &EntityRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&entity.status) {
            return false;
        }
        if let Some(ids) = &self.entity_ids {
            if !ids.contains(&entity.entity_id) {
                return false;
            }
        }
        if let Some(ceiling) = self.max_error_count {
            if entity.error_count > ceiling {
                return false;
            }
        }
        true
    }
}

/// Scheduling order: requested entities first, then by id
pub fn schedule_order(a: &EntityRecord, b: &EntityRecord) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}
