//! Global phase transitions
//!
//! The phase is derived from the entity aggregate once per cycle and only
//! moves forward, except for the daily refresh (COMPLETED -> PROCESSING_TTM)
//! and explicit operator resets.

use crate::progress::{EntityRecord, GlobalPhaseRecord, Phase, ProgressSummary};
use chrono::{DateTime, Duration, Utc};

/// Phase after a cycle, given the aggregate at its end.
///
/// The historical phase ends once every schedulable entity holds history and
/// none is still queued, so a forced refresh runs through the whole universe.
pub fn next_phase(current: Phase, summary: &ProgressSummary) -> Phase {
    let schedulable = summary.schedulable();
    match current {
        Phase::ProcessingHistorical
            if schedulable > 0
                && summary.with_history >= schedulable
                && summary.completed >= schedulable =>
        {
            Phase::ProcessingTtm
        }
        Phase::ProcessingTtm if schedulable > 0 && summary.updated_today >= schedulable => Phase::Completed,
        other => other,
    }
}

/// COMPLETED from an earlier UTC day starts a new TTM pass
pub fn refresh_due(record: &GlobalPhaseRecord, now: DateTime<Utc>) -> bool {
    record.phase == Phase::Completed
        && record
            .last_run_at
            .map(|at| at.date_naive() < now.date_naive())
            .unwrap_or(true)
}

/// Whether a COMPLETED entity still lacks what the current phase needs.
///
/// TTM needs an update from today; the historical phase needs statements.
/// Such entities go back in the queue, or the phase could never advance.
pub fn behind_phase(entity: &EntityRecord, phase: Phase, now: DateTime<Utc>) -> bool {
    match phase {
        Phase::ProcessingTtm => !entity.ttm_current(now),
        Phase::ProcessingHistorical => !entity.facets.historical_statements,
        Phase::Discovering | Phase::Completed => false,
    }
}

/// Whether the universe should be (re)discovered this cycle
pub fn discovery_due(record: &GlobalPhaseRecord, now: DateTime<Utc>, interval: Duration) -> bool {
    if record.phase == Phase::Discovering {
        return true;
    }
    match record.discovered_at {
        Some(at) => now - at >= interval,
        None => true,
    }
}
