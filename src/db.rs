// 🗄️ Durable Store - append-only `price_data` table in SQLite
//
// Rows are only ever inserted. Each batch goes through one transaction, so a
// page is either fully visible or not at all.

use crate::models::{PriceRecord, TIMESTAMP_FORMAT};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::path::Path;

pub const PRICE_TABLE: &str = "price_data";

/// Open (or create) the store and make sure the schema exists
pub fn open_store(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Price records (surrogate key only, no other constraints)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS price_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            period_id TEXT,
            period_name TEXT,
            category_id TEXT,
            category_name TEXT,
            item_name TEXT,
            specification TEXT,
            unit TEXT,
            price TEXT,
            update_time TIMESTAMP
        )",
        [],
    )
    .context("Failed to create price_data table")?;

    Ok(())
}

/// Append a batch of records inside a single transaction.
/// Returns the number of rows written.
pub fn insert_price_records(conn: &mut Connection, records: &[PriceRecord]) -> Result<usize> {
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO price_data (
                period_id, period_name, category_id, category_name,
                item_name, specification, unit, price, update_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for record in records {
            stmt.execute(params![
                record.period_id,
                record.period_name,
                record.category_id,
                record.category_name,
                record.item_name,
                record.specification,
                record.unit,
                record.price,
                record.update_time.format(TIMESTAMP_FORMAT).to_string(),
            ])
            .with_context(|| format!("Failed to insert record: {}", record.item_name))?;
        }
    }

    tx.commit().context("Failed to commit page")?;
    Ok(records.len())
}

/// All stored records in insertion order
pub fn get_price_records(conn: &Connection) -> Result<Vec<PriceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT period_id, period_name, category_id, category_name,
                item_name, specification, unit, price, update_time
         FROM price_data
         ORDER BY id",
    )?;

    let rows = stmt.query_map([], |row| {
        let update_time: Option<String> = row.get(8)?;
        let update_time = match update_time {
            Some(text) => NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
            })?,
            None => NaiveDateTime::MIN,
        };

        Ok(PriceRecord {
            period_id: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            period_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            category_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            category_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            item_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            specification: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            unit: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            price: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            update_time,
        })
    })?;

    let records = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read price records")?;

    Ok(records)
}

/// Verify count
pub fn count_records(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM price_data", [], |row| row.get(0))?;
    Ok(count)
}

/// User tables of any SQLite file, sorted by name
pub fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
    let names = stmt.query_map([], |row| row.get(0))?;
    names.collect()
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
