//! Per-entity progress record and its state machine
//!
//! ```text
//! PENDING    --claim-->                          PROCESSING
//! PROCESSING --complete-->                       COMPLETED
//! PROCESSING --fail (errors < max_errors)-->     PENDING
//! PROCESSING --fail (errors >= max_errors)-->    ERROR
//! PROCESSING --reclaim_if_stale-->               PENDING
//! COMPLETED  --requeue-->                        PENDING
//! any        --reset-->                          PENDING
//! ```

use crate::providers::types::Facet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Pending => "PENDING",
            EntityStatus::Processing => "PROCESSING",
            EntityStatus::Completed => "COMPLETED",
            EntityStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EntityStatus::Pending),
            "PROCESSING" => Ok(EntityStatus::Processing),
            "COMPLETED" => Ok(EntityStatus::Completed),
            "ERROR" => Ok(EntityStatus::Error),
            _ => Err(format!("unknown entity status: {}", s)),
        }
    }
}

/// Normal entities vs ones an operator explicitly asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Normal,
    Requested,
}

impl PriorityClass {
    pub fn as_i64(self) -> i64 {
        match self {
            PriorityClass::Normal => 0,
            PriorityClass::Requested => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value > 0 {
            PriorityClass::Requested
        } else {
            PriorityClass::Normal
        }
    }
}

/// Which categories of data an entity already has
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetFlags {
    pub basic_profile: bool,
    pub historical_statements: bool,
    pub ttm_update: bool,
    pub secondary_provider: bool,
}

impl FacetFlags {
    pub fn has(&self, facet: Facet) -> bool {
        match facet {
            Facet::BasicProfile => self.basic_profile,
            Facet::HistoricalStatements => self.historical_statements,
            Facet::TtmUpdate => self.ttm_update,
            Facet::SecondaryProvider => self.secondary_provider,
        }
    }

    /// Set a flag. Flags only ever go from false to true here.
    pub fn mark(&mut self, facet: Facet) {
        match facet {
            Facet::BasicProfile => self.basic_profile = true,
            Facet::HistoricalStatements => self.historical_statements = true,
            Facet::TtmUpdate => self.ttm_update = true,
            Facet::SecondaryProvider => self.secondary_provider = true,
        }
    }
}

/// Persistent progress for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub status: EntityStatus,
    pub facets: FacetFlags,
    /// Consecutive failures since the last success
    pub error_count: u32,
    pub last_error: Option<String>,
    pub priority: PriorityClass,
    /// Total attempts ever made
    pub attempts: u32,
    /// Fiscal years written so far
    pub years_acquired: u32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl EntityRecord {
    /// A freshly discovered entity
    pub fn new(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            status: EntityStatus::Pending,
            facets: FacetFlags::default(),
            error_count: 0,
            last_error: None,
            priority: PriorityClass::Normal,
            attempts: 0,
            years_acquired: 0,
            last_attempted_at: None,
            last_completed_at: None,
        }
    }

    /// Take ownership for one attempt
    pub fn claim(&mut self, now: DateTime<Utc>) {
        self.status = EntityStatus::Processing;
        self.attempts += 1;
        self.last_attempted_at = Some(now);
    }

    /// Record a successful attempt
    pub fn complete(&mut self, satisfied: &[Facet], years_written: u32, now: DateTime<Utc>) {
        for &facet in satisfied {
            self.facets.mark(facet);
        }
        self.status = EntityStatus::Completed;
        self.error_count = 0;
        self.last_error = None;
        self.priority = PriorityClass::Normal;
        self.years_acquired = self.years_acquired.max(years_written);
        self.last_completed_at = Some(now);
    }

    /// Record a failed attempt; ERROR once `max_errors` consecutive failures pile up
    pub fn fail(&mut self, error: &str, max_errors: u32) {
        self.error_count += 1;
        self.last_error = Some(error.to_string());
        self.status = if self.error_count >= max_errors {
            EntityStatus::Error
        } else {
            EntityStatus::Pending
        };
    }

    /// Return a stuck claim to the queue. Returns true when reclaimed.
    pub fn reclaim_if_stale(&mut self, now: DateTime<Utc>, staleness: Duration) -> bool {
        if self.status != EntityStatus::Processing {
            return false;
        }
        let stale = match self.last_attempted_at {
            Some(at) => now - at > staleness,
            None => true,
        };
        if stale {
            self.status = EntityStatus::Pending;
        }
        stale
    }

    /// Queue a completed entity again for a refresh pass; flags are kept
    pub fn requeue(&mut self) -> bool {
        if self.status == EntityStatus::Completed {
            self.status = EntityStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Explicit whole-entity reset: the only way facet flags are cleared
    pub fn reset(&mut self) {
        let priority = self.priority;
        *self = EntityRecord::new(&self.entity_id);
        self.priority = priority;
    }

    /// Force the entity into the queue ahead of normal work.
    ///
    /// An ERROR entity gets a fresh error budget so the ceiling cannot hide it.
    pub fn request(&mut self) {
        self.priority = PriorityClass::Requested;
        if self.status == EntityStatus::Error {
            self.error_count = 0;
        }
        if self.status != EntityStatus::Processing {
            self.status = EntityStatus::Pending;
        }
    }

    /// Whether the TTM facet was refreshed on `today`'s UTC date
    pub fn ttm_current(&self, now: DateTime<Utc>) -> bool {
        self.facets.ttm_update
            && self
                .last_completed_at
                .map(|at| at.date_naive() == now.date_naive())
                .unwrap_or(false)
    }
}
