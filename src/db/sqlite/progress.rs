//! Entity progress persistence

use super::{conversion_error, format_time, parse_time};
use crate::error::Result;
use crate::progress::{
    EntityRecord, EntityStatus, FacetFlags, PriorityClass, ProgressFilter, ProgressSummary,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTITY_COLUMNS: &str = "entity_id, status, has_basic_profile, has_historical, has_ttm, \
     has_secondary, error_count, last_error, priority, attempts, years_acquired, \
     last_attempted_at, last_completed_at";

fn entity_from_row(row: &Row) -> rusqlite::Result<EntityRecord> {
    let status: String = row.get(1)?;
    let status = status
        .parse::<EntityStatus>()
        .map_err(|e| conversion_error(1, e))?;

    Ok(EntityRecord {
        entity_id: row.get(0)?,
        status,
        facets: FacetFlags {
            basic_profile: row.get::<_, i32>(2)? == 1,
            historical_statements: row.get::<_, i32>(3)? == 1,
            ttm_update: row.get::<_, i32>(4)? == 1,
            secondary_provider: row.get::<_, i32>(5)? == 1,
        },
        error_count: row.get(6)?,
        last_error: row.get(7)?,
        priority: PriorityClass::from_i64(row.get(8)?),
        attempts: row.get(9)?,
        years_acquired: row.get(10)?,
        last_attempted_at: parse_time(11, row.get(11)?)?,
        last_completed_at: parse_time(12, row.get(12)?)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Load entities matching a filter, requested first then by id
pub fn load_entities(conn: &Connection, filter: &ProgressFilter) -> Result<Vec<EntityRecord>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !filter.statuses.is_empty() {
        clauses.push(format!("status IN ({})", placeholders(filter.statuses.len())));
        for status in &filter.statuses {
            params.push(Box::new(status.as_str()));
        }
    }
    if let Some(ids) = &filter.entity_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        clauses.push(format!("entity_id IN ({})", placeholders(ids.len())));
        for id in ids {
            params.push(Box::new(id.clone()));
        }
    }
    if let Some(ceiling) = filter.max_error_count {
        clauses.push("error_count <= ?".to_string());
        params.push(Box::new(ceiling));
    }

    let mut sql = format!("SELECT {} FROM entity_progress", ENTITY_COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY priority DESC, entity_id ASC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let entities = stmt
        .query_map(params_refs.as_slice(), entity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(entities)
}

/// Get one entity by id
pub fn get_entity(conn: &Connection, entity_id: &str) -> Result<Option<EntityRecord>> {
    let sql = format!(
        "SELECT {} FROM entity_progress WHERE entity_id = ?",
        ENTITY_COLUMNS
    );
    let entity = conn
        .query_row(&sql, [entity_id], entity_from_row)
        .optional()?;
    Ok(entity)
}

/// Insert or replace one entity
pub fn save_entity(conn: &Connection, record: &EntityRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO entity_progress (entity_id, status, has_basic_profile, has_historical,
            has_ttm, has_secondary, error_count, last_error, priority, attempts,
            years_acquired, last_attempted_at, last_completed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, datetime('now'))
         ON CONFLICT(entity_id) DO UPDATE SET
            status = excluded.status,
            has_basic_profile = excluded.has_basic_profile,
            has_historical = excluded.has_historical,
            has_ttm = excluded.has_ttm,
            has_secondary = excluded.has_secondary,
            error_count = excluded.error_count,
            last_error = excluded.last_error,
            priority = excluded.priority,
            attempts = excluded.attempts,
            years_acquired = excluded.years_acquired,
            last_attempted_at = excluded.last_attempted_at,
            last_completed_at = excluded.last_completed_at,
            updated_at = excluded.updated_at",
        params![
            record.entity_id,
            record.status.as_str(),
            record.facets.basic_profile as i32,
            record.facets.historical_statements as i32,
            record.facets.ttm_update as i32,
            record.facets.secondary_provider as i32,
            record.error_count,
            record.last_error,
            record.priority.as_i64(),
            record.attempts,
            record.years_acquired,
            format_time(record.last_attempted_at),
            format_time(record.last_completed_at),
        ],
    )?;
    Ok(())
}

/// Save several entities in one transaction
pub fn save_entities(conn: &Connection, records: &[EntityRecord]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for record in records {
        save_entity(&tx, record)?;
    }
    tx.commit()?;
    Ok(())
}

/// Reset selected entities, or all of them
pub fn reset_entities(conn: &Connection, entity_ids: Option<&[String]>) -> Result<usize> {
    const RESET: &str = "UPDATE entity_progress SET status = 'PENDING', has_basic_profile = 0,
            has_historical = 0, has_ttm = 0, has_secondary = 0, error_count = 0,
            last_error = NULL, attempts = 0, years_acquired = 0, last_attempted_at = NULL,
            last_completed_at = NULL, updated_at = datetime('now')";

    let count = match entity_ids {
        None => conn.execute(RESET, [])?,
        Some(ids) => {
            let tx = conn.unchecked_transaction()?;
            let mut count = 0;
            {
                let mut stmt = tx.prepare(&format!("{} WHERE entity_id = ?", RESET))?;
                for id in ids {
                    count += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            count
        }
    };

    tracing::info!("Reset progress for {} entities", count);
    Ok(count)
}

/// Register unknown entities as PENDING
pub fn register_entities(
    conn: &Connection,
    entity_ids: &[String],
    priority: PriorityClass,
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut added = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO entity_progress (entity_id, status, priority)
             VALUES (?1, 'PENDING', ?2)",
        )?;
        for id in entity_ids {
            added += stmt.execute(params![id, priority.as_i64()])?;
        }
    }
    tx.commit()?;
    Ok(added)
}

/// Aggregate counts; ERROR entities only count toward `total` and `errored`
pub fn summary(conn: &Connection, now: DateTime<Utc>) -> Result<ProgressSummary> {
    let today = now.date_naive().to_string();
    let summary = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(status = 'PENDING'), 0),
            COALESCE(SUM(status = 'PROCESSING'), 0),
            COALESCE(SUM(status = 'COMPLETED'), 0),
            COALESCE(SUM(status = 'ERROR'), 0),
            COALESCE(SUM(status != 'ERROR' AND has_historical = 1), 0),
            COALESCE(SUM(status != 'ERROR' AND has_ttm = 1
                AND substr(last_completed_at, 1, 10) = ?1), 0)
         FROM entity_progress",
        [today],
        |row| {
            Ok(ProgressSummary {
                total: row.get::<_, i64>(0)? as u64,
                pending: row.get::<_, i64>(1)? as u64,
                processing: row.get::<_, i64>(2)? as u64,
                completed: row.get::<_, i64>(3)? as u64,
                errored: row.get::<_, i64>(4)? as u64,
                with_history: row.get::<_, i64>(5)? as u64,
                updated_today: row.get::<_, i64>(6)? as u64,
            })
        },
    )?;
    Ok(summary)
}
