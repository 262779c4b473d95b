//! Global phase persistence (singleton row)

use super::{conversion_error, format_time, parse_time};
use crate::error::Result;
use crate::progress::{GlobalPhaseRecord, Phase};
use rusqlite::{params, Connection, OptionalExtension};

/// Load the phase record, if one was ever saved
pub fn load_phase(conn: &Connection) -> Result<Option<GlobalPhaseRecord>> {
    let record = conn
        .query_row(
            "SELECT phase, cursor, total_entities, entities_with_history,
                    entities_updated_today, last_run_at, discovered_at
             FROM global_phase WHERE id = 1",
            [],
            |row| {
                let phase: String = row.get(0)?;
                Ok(GlobalPhaseRecord {
                    phase: phase.parse::<Phase>().map_err(|e| conversion_error(0, e))?,
                    cursor: row.get(1)?,
                    total_entities: row.get::<_, i64>(2)? as u64,
                    entities_with_history: row.get::<_, i64>(3)? as u64,
                    entities_updated_today: row.get::<_, i64>(4)? as u64,
                    last_run_at: parse_time(5, row.get(5)?)?,
                    discovered_at: parse_time(6, row.get(6)?)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Insert or replace the phase record
pub fn save_phase(conn: &Connection, record: &GlobalPhaseRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO global_phase (id, phase, cursor, total_entities, entities_with_history,
            entities_updated_today, last_run_at, discovered_at, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            phase = excluded.phase,
            cursor = excluded.cursor,
            total_entities = excluded.total_entities,
            entities_with_history = excluded.entities_with_history,
            entities_updated_today = excluded.entities_updated_today,
            last_run_at = excluded.last_run_at,
            discovered_at = excluded.discovered_at,
            updated_at = excluded.updated_at",
        params![
            record.phase.as_str(),
            record.cursor,
            record.total_entities as i64,
            record.entities_with_history as i64,
            record.entities_updated_today as i64,
            format_time(record.last_run_at),
            format_time(record.discovered_at),
        ],
    )?;
    Ok(())
}
