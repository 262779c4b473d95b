//! Consolidated financials persistence

use super::{format_time, parse_time};
use crate::error::Result;
use crate::reconcile::ConsolidatedRecord;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

struct StoredRow {
    entity_id: String,
    year: i32,
    fields: String,
    sources: String,
    updated_at: Option<String>,
}

fn stored_from_row(row: &Row) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        entity_id: row.get(0)?,
        year: row.get(1)?,
        fields: row.get(2)?,
        sources: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn decode(row: StoredRow) -> Result<ConsolidatedRecord> {
    Ok(ConsolidatedRecord {
        entity_id: row.entity_id,
        year: row.year,
        fields: serde_json::from_str(&row.fields)?,
        sources: serde_json::from_str(&row.sources)?,
        updated_at: parse_time(4, row.updated_at)?,
    })
}

/// Load one (entity, year)
pub fn load_record(conn: &Connection, entity_id: &str, year: i32) -> Result<Option<ConsolidatedRecord>> {
    let row = conn
        .query_row(
            "SELECT entity_id, year, fields, sources, updated_at
             FROM consolidated_financials WHERE entity_id = ?1 AND year = ?2",
            params![entity_id, year],
            stored_from_row,
        )
        .optional()?;
    row.map(decode).transpose()
}

/// Load every year for an entity, oldest first
pub fn load_entity_records(conn: &Connection, entity_id: &str) -> Result<Vec<ConsolidatedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, year, fields, sources, updated_at
         FROM consolidated_financials WHERE entity_id = ? ORDER BY year ASC",
    )?;
    let rows = stmt
        .query_map([entity_id], stored_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(decode).collect()
}

/// Merge into the stored row and write it back
pub fn upsert_record(conn: &Connection, record: &ConsolidatedRecord) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    let mut merged = record.clone();
    if let Some(existing) = load_record(&tx, &record.entity_id, record.year)? {
        merged.fill_missing_from(&existing);
    }
    merged.updated_at = Some(Utc::now());

    tx.execute(
        "INSERT INTO consolidated_financials (entity_id, year, fields, sources, provenance, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(entity_id, year) DO UPDATE SET
            fields = excluded.fields,
            sources = excluded.sources,
            provenance = excluded.provenance,
            updated_at = excluded.updated_at",
        params![
            merged.entity_id,
            merged.year,
            serde_json::to_string(&merged.fields)?,
            serde_json::to_string(&merged.sources)?,
            merged.provenance(),
            format_time(merged.updated_at),
        ],
    )?;

    tx.commit()?;
    Ok(())
}
