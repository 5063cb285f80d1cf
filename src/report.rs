// 📊 Audit Report - JSON document + console tables from the audit counts

use crate::models::{period_date, Year};
use crate::sink::AuditCounts;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const CHECK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const REPORT_NOTE: &str =
    "Counts come from the `total` field of each category's first page; they are the server-side record counts.";

// ============================================================================
// REPORT DOCUMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub summary: ReportSummary,
    pub detailed_data: BTreeMap<Year, BTreeMap<String, PeriodDetail>>,
    pub check_time: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_all_years: u64,
    pub total_by_year: BTreeMap<Year, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodDetail {
    pub period_total: u64,
    pub categories: BTreeMap<String, u64>,
}

impl AuditReport {
    pub fn from_counts(counts: &AuditCounts, checked_at: NaiveDateTime) -> Self {
        let mut detailed_data = BTreeMap::new();

        for year in counts.years() {
            let periods: BTreeMap<String, PeriodDetail> = counts
                .periods(year)
                .into_iter()
                .map(|period| {
                    let categories = counts.categories(year, period).cloned().unwrap_or_default();
                    let detail = PeriodDetail {
                        period_total: categories.values().sum(),
                        categories,
                    };
                    (period.to_string(), detail)
                })
                .collect();
            detailed_data.insert(year, periods);
        }

        AuditReport {
            summary: ReportSummary {
                total_all_years: counts.total_all_years(),
                total_by_year: counts.year_totals().clone(),
            },
            detailed_data,
            check_time: checked_at.format(CHECK_TIME_FORMAT).to_string(),
            note: REPORT_NOTE.to_string(),
        }
    }

    /// Pretty JSON, non-ASCII kept as-is
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("Failed to serialize report")?;
        writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// CONSOLE TABLES
// ============================================================================

fn width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, columns: usize) -> String {
    let fill = columns.saturating_sub(width(text));
    format!("{}{}", text, " ".repeat(fill))
}

/// Year | total | number of periods, most recent year first
pub fn render_year_summary(counts: &AuditCounts) -> String {
    if counts.is_empty() {
        return "No data collected\n".to_string();
    }

    let year_col = counts
        .years()
        .iter()
        .map(|y| width(&y.to_string()))
        .chain([width("Year")])
        .max()
        .unwrap_or(4)
        + 4;
    let total_col = counts
        .year_totals()
        .values()
        .map(|t| width(&t.to_string()))
        .chain([width("Records")])
        .max()
        .unwrap_or(7)
        + 4;

    let mut out = String::new();
    out.push_str(&format!("{} | {} | Periods\n", pad("Year", year_col), pad("Records", total_col)));
    out.push_str(&"-".repeat(year_col + total_col + 12));
    out.push('\n');

    for year in counts.years().into_iter().rev() {
        out.push_str(&format!(
            "{} | {} | {}\n",
            pad(&year.to_string(), year_col),
            pad(&counts.year_total(year).to_string(), total_col),
            counts.periods(year).len()
        ));
    }
    out
}

/// Period | records for one year, most recent period first
pub fn render_period_details(counts: &AuditCounts, year: Year) -> String {
    let mut periods = counts.periods(year);
    if periods.is_empty() {
        return format!("No periods recorded for {}\n", year);
    }
    // BTreeMap order is by name; show by the date in the name instead
    periods.sort_by(|a, b| period_date(b).cmp(&period_date(a)));

    let period_col = periods
        .iter()
        .map(|p| width(p))
        .chain([width("Period")])
        .max()
        .unwrap_or(6)
        + 4;

    let mut out = String::new();
    out.push_str(&format!("{} | Records\n", pad("Period", period_col)));
    out.push_str(&"-".repeat(period_col + 10));
    out.push('\n');

    for period in periods {
        out.push_str(&format!(
            "{} | {}\n",
            pad(period, period_col),
            counts.period_total(year, period)
        ));
    }
    out
}
