// 📤 Export Utility - SQLite tables → .xlsx workbook (or CSV files)
//
// Independent of the crawler: works on any SQLite file. One sheet per table,
// header row = column names, data rows verbatim. Failures come back as
// `ExportError` with enough context for the caller to explain them.

use crate::config::SHEET_NAME_LIMIT;
use crate::db::{list_tables, table_exists};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use rust_xlsxwriter::{Workbook, XlsxError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Entries shown from the working directory when the store is missing
const LISTING_LIMIT: usize = 10;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database file not found: {}", .path.display())]
    MissingDatabase {
        path: PathBuf,
        current_dir: Option<PathBuf>,
        directory_listing: Vec<String>,
    },

    #[error("table `{table}` does not exist (available: {})", .available.join(", "))]
    MissingTable { table: String, available: Vec<String> },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] XlsxError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// TABLE SNAPSHOT
// ============================================================================

/// A cell exactly as SQLite stored it
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(f) => CellValue::Real(f),
            ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
        }
    }

    /// Text form used for CSV output and blob cells
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Real(f) => f.to_string(),
            CellValue::Text(t) => t.clone(),
            CellValue::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

/// One table read into memory, ready to become a sheet
#[derive(Debug, Clone, PartialEq)]
pub struct TableSheet {
    pub table: String,
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// What an export produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    /// Workbook path or CSV directory; None when there was nothing to write
    pub output: Option<PathBuf>,
    /// (table, data rows) in export order
    pub tables: Vec<(String, usize)>,
}

/// Sheet titles are capped at 31 characters
pub fn sheet_name(table: &str) -> String {
    table.chars().take(SHEET_NAME_LIMIT).collect()
}

/// Truncated sheet name that is not in `used` (lowercased names).
/// Clashes get a numeric suffix, shortening the base to stay within the limit.
fn unique_sheet_name(table: &str, used: &HashSet<String>) -> String {
    let name = sheet_name(table);
    if !used.contains(&name.to_lowercase()) {
        return name;
    }

    (1usize..)
        .map(|n| {
            let suffix = n.to_string();
            let base: String = table
                .chars()
                .take(SHEET_NAME_LIMIT.saturating_sub(suffix.len()))
                .collect();
            format!("{}{}", base, suffix)
        })
        .find(|candidate| !used.contains(&candidate.to_lowercase()))
        .unwrap_or(name)
}

/// `prices.db` → `prices.xlsx`
pub fn default_output_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("xlsx")
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// READING
// ============================================================================

/// Open an existing store; never creates a file
pub fn open_existing(db_path: &Path) -> Result<Connection, ExportError> {
    if !db_path.is_file() {
        let current_dir = std::env::current_dir().ok();
        let mut directory_listing: Vec<String> = fs::read_dir(".")
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        directory_listing.sort();
        directory_listing.truncate(LISTING_LIMIT);

        return Err(ExportError::MissingDatabase {
            path: db_path.to_path_buf(),
            current_dir,
            directory_listing,
        });
    }

    // no SQLITE_OPEN_CREATE; read-write so WAL stores can map their -shm file
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Read one named table, or every table when `table` is None
pub fn read_tables(conn: &Connection, table: Option<&str>) -> Result<Vec<TableSheet>, ExportError> {
    let names = match table {
        Some(name) => {
            if !table_exists(conn, name)? {
                return Err(ExportError::MissingTable {
                    table: name.to_string(),
                    available: list_tables(conn)?,
                });
            }
            vec![name.to_string()]
        }
        None => list_tables(conn)?,
    };

    let mut used = HashSet::new();
    let mut sheets = Vec::with_capacity(names.len());
    for name in &names {
        let mut sheet = read_table(conn, name)?;
        sheet.sheet_name = unique_sheet_name(name, &used);
        used.insert(sheet.sheet_name.to_lowercase());
        sheets.push(sheet);
    }

    Ok(sheets)
}

fn read_table(conn: &Connection, table: &str) -> Result<TableSheet, ExportError> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_identifier(table)))?;
    let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = headers.len();

    let mut rows = Vec::new();
    let mut result = stmt.query([])?;
    while let Some(row) = result.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            cells.push(CellValue::from_sql(row.get_ref(idx)?));
        }
        rows.push(cells);
    }

    Ok(TableSheet {
        table: table.to_string(),
        sheet_name: sheet_name(table),
        headers,
        rows,
    })
}

// ============================================================================
// WRITING
// ============================================================================

pub fn write_workbook(sheets: &[TableSheet], path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.sheet_name)?;

        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }

        for (idx, cells) in sheet.rows.iter().enumerate() {
            let row = (idx + 1) as u32;
            for (col, cell) in cells.iter().enumerate() {
                let col = col as u16;
                match cell {
                    CellValue::Null => {}
                    CellValue::Integer(i) => {
                        worksheet.write_number(row, col, *i as f64)?;
                    }
                    CellValue::Real(f) => {
                        worksheet.write_number(row, col, *f)?;
                    }
                    CellValue::Text(t) => {
                        worksheet.write_string(row, col, t)?;
                    }
                    CellValue::Blob(_) => {
                        worksheet.write_string(row, col, cell.to_text())?;
                    }
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// One `<table>.csv` per sheet inside `dir`
pub fn write_csv_files(sheets: &[TableSheet], dir: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(dir)?;

    for sheet in sheets {
        let path = dir.join(format!("{}.csv", sheet.table));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&sheet.headers)?;
        for cells in &sheet.rows {
            writer.write_record(cells.iter().map(CellValue::to_text))?;
        }
        writer.flush()?;
    }

    Ok(())
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Export to a workbook. `output` defaults to the store path with `.xlsx`.
/// A store without tables is a success that writes nothing.
pub fn export_to_xlsx(
    db_path: &Path,
    output: Option<&Path>,
    table: Option<&str>,
) -> Result<ExportSummary, ExportError> {
    let conn = open_existing(db_path)?;
    info!(db = %db_path.display(), "connected to database");

    let sheets = read_tables(&conn, table)?;
    if sheets.is_empty() {
        info!("database has no tables, nothing to export");
        return Ok(ExportSummary::default());
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(db_path));
    write_workbook(&sheets, &output)?;

    Ok(summarize(&sheets, output))
}

/// Export every table (or the named one) as CSV files into `dir`
pub fn export_to_csv(
    db_path: &Path,
    dir: &Path,
    table: Option<&str>,
) -> Result<ExportSummary, ExportError> {
    let conn = open_existing(db_path)?;
    info!(db = %db_path.display(), "connected to database");

    let sheets = read_tables(&conn, table)?;
    if sheets.is_empty() {
        info!("database has no tables, nothing to export");
        return Ok(ExportSummary::default());
    }

    write_csv_files(&sheets, dir)?;
    Ok(summarize(&sheets, dir.to_path_buf()))
}

fn summarize(sheets: &[TableSheet], output: PathBuf) -> ExportSummary {
    let tables = sheets
        .iter()
        .map(|sheet| {
            info!(table = %sheet.table, rows = sheet.rows.len(), "table exported");
            (sheet.table.clone(), sheet.rows.len())
        })
        .collect();

    ExportSummary {
        output: Some(output),
        tables,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE price_data (id INTEGER PRIMARY KEY, item_name TEXT, price TEXT, weight REAL, note BLOB);
             INSERT INTO price_data (item_name, price, weight, note) VALUES ('Rebar', '4210', 1.5, NULL);
             INSERT INTO price_data (item_name, price, weight, note) VALUES ('Cement', '面议', NULL, x'6869');
             CREATE TABLE a_table_with_a_really_long_descriptive_name (x INTEGER);",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_sheet_name_truncated() {
        assert_eq!(sheet_name("price_data"), "price_data");
        let long = "a_table_with_a_really_long_descriptive_name";
        assert_eq!(sheet_name(long).chars().count(), 31);
        assert!(long.starts_with(&sheet_name(long)));
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("data/sz_price_info.db")),
            PathBuf::from("data/sz_price_info.xlsx")
        );
    }

    #[test]
    fn test_read_tables_round_trip() {
        let (_dir, path) = create_test_store();
        let conn = open_existing(&path).unwrap();

        let sheets = read_tables(&conn, Some("price_data")).unwrap();

        assert_eq!(sheets.len(), 1);
        let sheet = &sheets[0];
        assert_eq!(sheet.headers, vec!["id", "item_name", "price", "weight", "note"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(
            sheet.rows[0],
            vec![
                CellValue::Integer(1),
                CellValue::Text("Rebar".to_string()),
                CellValue::Text("4210".to_string()),
                CellValue::Real(1.5),
                CellValue::Null,
            ]
        );
        assert_eq!(sheet.rows[1][2], CellValue::Text("面议".to_string()));
        assert_eq!(sheet.rows[1][4], CellValue::Blob(b"hi".to_vec()));
    }

    #[test]
    fn test_read_all_tables_sorted() {
        let (_dir, path) = create_test_store();
        let conn = open_existing(&path).unwrap();

        let sheets = read_tables(&conn, None).unwrap();
        let names: Vec<&str> = sheets.iter().map(|s| s.table.as_str()).collect();

        assert_eq!(names, vec!["a_table_with_a_really_long_descriptive_name", "price_data"]);
        assert_eq!(sheets[0].sheet_name.chars().count(), 31);
        assert!(sheets[0].rows.is_empty());
    }

    #[test]
    fn test_export_xlsx_writes_workbook() {
        let (dir, path) = create_test_store();

        let summary = export_to_xlsx(&path, None, None).unwrap();

        let expected = dir.path().join("prices.xlsx");
        assert_eq!(summary.output, Some(expected.clone()));
        assert!(expected.is_file());
        assert!(summary.tables.contains(&("price_data".to_string(), 2)));
    }

    #[test]
    fn test_workbook_matches_tables() {
        let (dir, path) = create_test_store();
        let output = dir.path().join("check.xlsx");

        export_to_xlsx(&path, Some(&output), None).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&output).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec!["a_table_with_a_really_long_desc".to_string(), "price_data".to_string()]
        );

        let range = workbook.worksheet_range("price_data").unwrap();
        assert_eq!(range.height(), 3, "header + 2 data rows");

        let rows: Vec<&[Data]> = range.rows().collect();
        let header: Vec<Data> = ["id", "item_name", "price", "weight", "note"]
            .iter()
            .map(|h| Data::String(h.to_string()))
            .collect();
        assert_eq!(rows[0], &header[..]);

        assert_eq!(
            rows[1],
            &[
                Data::Float(1.0),
                Data::String("Rebar".to_string()),
                Data::String("4210".to_string()),
                Data::Float(1.5),
                Data::Empty,
            ][..]
        );
        assert_eq!(rows[2][2], Data::String("面议".to_string()));
        assert_eq!(rows[2][3], Data::Empty);
        assert_eq!(rows[2][4], Data::String("hi".to_string()));
    }

    #[test]
    fn test_truncated_sheet_names_made_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE monthly_material_price_snapshot_a (x INTEGER);
                 CREATE TABLE monthly_material_price_snapshot_b (x INTEGER);
                 CREATE TABLE monthly_material_price_snapshot_c (x INTEGER);
                 INSERT INTO monthly_material_price_snapshot_b (x) VALUES (7);",
            )
            .unwrap();

        let summary = export_to_xlsx(&path, None, None).unwrap();
        assert_eq!(summary.tables.len(), 3);

        let output = dir.path().join("snapshots.xlsx");
        let mut workbook: Xlsx<_> = open_workbook(&output).unwrap();
        let names = workbook.sheet_names();
        assert_eq!(
            names,
            vec![
                "monthly_material_price_snapshot".to_string(),
                "monthly_material_price_snapsho1".to_string(),
                "monthly_material_price_snapsho2".to_string(),
            ]
        );
        assert!(names.iter().all(|n| n.chars().count() <= SHEET_NAME_LIMIT));

        let range = workbook.worksheet_range("monthly_material_price_snapsho1").unwrap();
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(7.0)));
    }

    #[test]
    fn test_unique_sheet_name_ignores_case() {
        let mut used = HashSet::new();
        used.insert("price_data".to_string());

        assert_eq!(unique_sheet_name("PRICE_DATA", &used), "PRICE_DATA1");
        assert_eq!(unique_sheet_name("units", &used), "units");
    }

    #[test]
    fn test_export_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");
        let output = dir.path().join("nope.xlsx");

        let err = export_to_xlsx(&missing, Some(&output), None).unwrap_err();

        assert!(matches!(err, ExportError::MissingDatabase { .. }));
        assert!(!output.exists(), "no workbook should be written");
        assert!(!missing.exists(), "the store must not be created");
    }

    #[test]
    fn test_export_missing_table_lists_available() {
        let (dir, path) = create_test_store();
        let output = dir.path().join("out.xlsx");

        let err = export_to_xlsx(&path, Some(&output), Some("users")).unwrap_err();

        match err {
            ExportError::MissingTable { table, available } => {
                assert_eq!(table, "users");
                assert!(available.contains(&"price_data".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_export_empty_database_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA user_version = 1;")
            .unwrap();

        let summary = export_to_xlsx(&path, None, None).unwrap();

        assert_eq!(summary, ExportSummary::default());
        assert!(!dir.path().join("empty.xlsx").exists());
    }

    #[test]
    fn test_export_csv() {
        let (dir, path) = create_test_store();
        let out_dir = dir.path().join("csv");

        let summary = export_to_csv(&path, &out_dir, Some("price_data")).unwrap();

        assert_eq!(summary.tables, vec![("price_data".to_string(), 2)]);
        let text = fs::read_to_string(out_dir.join("price_data.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,item_name,price,weight,note");
        assert_eq!(lines[1], "1,Rebar,4210,1.5,");
        assert_eq!(lines[2], "2,Cement,面议,,hi");
    }
}
