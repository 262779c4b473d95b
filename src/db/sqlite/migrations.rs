//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_entity_progress", CREATE_ENTITY_PROGRESS_TABLE)?;
    run_migration(conn, "002_global_phase", CREATE_GLOBAL_PHASE_TABLE)?;
    run_migration(conn, "003_consolidated_financials", CREATE_CONSOLIDATED_FINANCIALS_TABLE)?;

    tracing::debug!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_ENTITY_PROGRESS_TABLE: &str = r#"
CREATE TABLE entity_progress (
    entity_id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'PENDING',
    has_basic_profile INTEGER NOT NULL DEFAULT 0,
    has_historical INTEGER NOT NULL DEFAULT 0,
    has_ttm INTEGER NOT NULL DEFAULT 0,
    has_secondary INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    priority INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    years_acquired INTEGER NOT NULL DEFAULT 0,
    last_attempted_at TEXT,
    last_completed_at TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_entity_progress_schedule
    ON entity_progress(status, priority DESC, entity_id);
"#;

const CREATE_GLOBAL_PHASE_TABLE: &str = r#"
CREATE TABLE global_phase (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    phase TEXT NOT NULL,
    cursor TEXT,
    total_entities INTEGER NOT NULL DEFAULT 0,
    entities_with_history INTEGER NOT NULL DEFAULT 0,
    entities_updated_today INTEGER NOT NULL DEFAULT 0,
    last_run_at TEXT,
    discovered_at TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_CONSOLIDATED_FINANCIALS_TABLE: &str = r#"
CREATE TABLE consolidated_financials (
    entity_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    fields TEXT NOT NULL,
    sources TEXT NOT NULL,
    provenance TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (entity_id, year)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_reentrant() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 3);
    }
}
