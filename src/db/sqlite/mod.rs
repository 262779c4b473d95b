//! SQLite database module

mod financials;
mod migrations;
mod phase;
mod progress;

use super::{FinancialsStore, ProgressStore};
use crate::error::Result;
use crate::progress::{
    EntityRecord, GlobalPhaseRecord, PriorityClass, ProgressFilter, ProgressSummary,
};
use crate::reconcile::ConsolidatedRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Create new SQLite database connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }
}

impl ProgressStore for SqliteDb {
    fn load_entity_progress(&self, filter: &ProgressFilter) -> Result<Vec<EntityRecord>> {
        let conn = self.conn.lock();
        progress::load_entities(&conn, filter)
    }

    fn get_entity_progress(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        let conn = self.conn.lock();
        progress::get_entity(&conn, entity_id)
    }

    fn save_entity_progress(&self, record: &EntityRecord) -> Result<()> {
        let conn = self.conn.lock();
        progress::save_entity(&conn, record)
    }

    fn save_entities_progress(&self, records: &[EntityRecord]) -> Result<()> {
        let conn = self.conn.lock();
        progress::save_entities(&conn, records)
    }

    fn reset_entity_progress(&self, entity_ids: Option<&[String]>) -> Result<usize> {
        let conn = self.conn.lock();
        progress::reset_entities(&conn, entity_ids)
    }

    fn register_entities(&self, entity_ids: &[String], priority: PriorityClass) -> Result<usize> {
        let conn = self.conn.lock();
        progress::register_entities(&conn, entity_ids, priority)
    }

    fn progress_summary(&self, now: DateTime<Utc>) -> Result<ProgressSummary> {
        let conn = self.conn.lock();
        progress::summary(&conn, now)
    }

    fn load_global_phase(&self) -> Result<Option<GlobalPhaseRecord>> {
        let conn = self.conn.lock();
        phase::load_phase(&conn)
    }

    fn save_global_phase(&self, record: &GlobalPhaseRecord) -> Result<()> {
        let conn = self.conn.lock();
        phase::save_phase(&conn, record)
    }
}

impl FinancialsStore for SqliteDb {
    fn load_consolidated(&self, entity_id: &str, year: i32) -> Result<Option<ConsolidatedRecord>> {
        let conn = self.conn.lock();
        financials::load_record(&conn, entity_id, year)
    }

    fn load_entity_financials(&self, entity_id: &str) -> Result<Vec<ConsolidatedRecord>> {
        let conn = self.conn.lock();
        financials::load_entity_records(&conn, entity_id)
    }

    fn upsert_consolidated(&self, record: &ConsolidatedRecord) -> Result<()> {
        let conn = self.conn.lock();
        financials::upsert_record(&conn, record)
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> Option<String> {
    time.map(|t| t.to_rfc3339())
}

fn parse_time(column: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| conversion_error(column, e.to_string()))
        })
        .transpose()
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}
