// 🧺 Persistence Sinks - where traversed pages end up
//
// CountingSink: audit mode, keeps year → period → category counts in memory.
// RowStoreSink: collection mode, appends every row to `price_data`, one
// SQLite transaction per page.

use crate::db;
use crate::models::{Category, Page, Period, PriceRecord, Year};
use anyhow::Result;
use chrono::Local;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Receives every page the traversal obtains, in traversal order
pub trait PageSink {
    fn on_page(&mut self, year: Year, period: &Period, category: &Category, page: &Page)
        -> Result<()>;
}

// ============================================================================
// AUDIT COUNTS
// ============================================================================

/// year → period name → category name → record count, plus per-year totals.
///
/// Merge rule: overwrite per key, never accumulate. Re-recording a key
/// replaces its count and moves the year total by the difference, so a year
/// total always equals the sum of its category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditCounts {
    by_year: BTreeMap<Year, BTreeMap<String, BTreeMap<String, u64>>>,
    year_totals: BTreeMap<Year, u64>,
}

impl AuditCounts {
    pub fn new() -> Self {
        AuditCounts::default()
    }

    /// Store `count` for the key; returns the count it replaced, if any
    pub fn record(&mut self, year: Year, period: &str, category: &str, count: u64) -> Option<u64> {
        let previous = self
            .by_year
            .entry(year)
            .or_default()
            .entry(period.to_string())
            .or_default()
            .insert(category.to_string(), count);

        let total = self.year_totals.entry(year).or_insert(0);
        *total = *total - previous.unwrap_or(0) + count;

        previous
    }

    pub fn category_count(&self, year: Year, period: &str, category: &str) -> Option<u64> {
        self.by_year.get(&year)?.get(period)?.get(category).copied()
    }

    /// Categories of one period with their counts
    pub fn categories(&self, year: Year, period: &str) -> Option<&BTreeMap<String, u64>> {
        self.by_year.get(&year)?.get(period)
    }

    pub fn period_total(&self, year: Year, period: &str) -> u64 {
        self.categories(year, period)
            .map(|c| c.values().sum())
            .unwrap_or(0)
    }

    /// Period names recorded under a year
    pub fn periods(&self, year: Year) -> Vec<&str> {
        self.by_year
            .get(&year)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Years with at least one recorded category, ascending
    pub fn years(&self) -> Vec<Year> {
        self.year_totals.keys().copied().collect()
    }

    pub fn year_total(&self, year: Year) -> u64 {
        self.year_totals.get(&year).copied().unwrap_or(0)
    }

    pub fn year_totals(&self) -> &BTreeMap<Year, u64> {
        &self.year_totals
    }

    pub fn total_all_years(&self) -> u64 {
        self.year_totals.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.year_totals.is_empty()
    }
}

// ============================================================================
// COUNTING SINK (audit mode)
// ============================================================================

#[derive(Debug, Default)]
pub struct CountingSink {
    counts: AuditCounts,
}

impl CountingSink {
    pub fn new() -> Self {
        CountingSink::default()
    }

    pub fn counts(&self) -> &AuditCounts {
        &self.counts
    }

    pub fn into_counts(self) -> AuditCounts {
        self.counts
    }
}

impl PageSink for CountingSink {
    fn on_page(&mut self, year: Year, period: &Period, category: &Category, page: &Page) -> Result<()> {
        let count = match page.total_count() {
            Some(count) => {
                info!("  category: {:<35} records: {}", category.name, count);
                count
            }
            None => {
                warn!(
                    total = ?page.total,
                    "  category: {:<35} records: 0 (no usable total)",
                    category.name
                );
                0
            }
        };

        self.counts.record(year, &period.name, &category.name, count);
        Ok(())
    }
}

// ============================================================================
// ROW STORE SINK (collection mode)
// ============================================================================

/// Appends rows to the durable store, committing once per page
pub struct RowStoreSink<'c> {
    conn: &'c mut Connection,
    inserted: usize,
}

impl<'c> RowStoreSink<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        RowStoreSink { conn, inserted: 0 }
    }

    /// Rows written by this sink so far
    pub fn inserted(&self) -> usize {
        self.inserted
    }
}

impl PageSink for RowStoreSink<'_> {
    fn on_page(&mut self, _year: Year, period: &Period, category: &Category, page: &Page) -> Result<()> {
        if page.is_empty() {
            return Ok(());
        }

        let captured_at = Local::now().naive_local();
        let records: Vec<PriceRecord> = page
            .rows
            .iter()
            .map(|row| PriceRecord::from_row(period, category, row, captured_at))
            .collect();

        let written = db::insert_price_records(self.conn, &records)?;
        self.inserted += written;

        info!(
            period = %period.name,
            category = %category.name,
            rows = written,
            "page committed"
        );
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
