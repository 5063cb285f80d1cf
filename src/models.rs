// 📦 Portal Data Model - typed records for the price portal's JSON shapes
//
// The portal answers with loosely shaped JSON: ids arrive as numbers or
// strings, `total` may be missing, null or text, `children` may be null and
// cells may be null. Every field below carries its own default so the
// traversal never probes raw JSON.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Format used for `update_time` in the store (microsecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

// ============================================================================
// YEAR
// ============================================================================

pub type Year = i32;

/// One entry of the `yearinfo` listing
#[derive(Debug, Clone, Deserialize)]
pub struct YearEntry {
    #[serde(rename = "yearNum", deserialize_with = "lenient_year")]
    pub year_num: Year,
}

/// Most recent year first
pub fn sort_years_desc(years: &mut [Year]) {
    years.sort_unstable_by(|a, b| b.cmp(a));
}

// ============================================================================
// PERIOD
// ============================================================================

/// A publication period within a year (e.g. "2024年3月")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// Opaque id; numbers on the wire are kept as their decimal text
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,

    #[serde(rename = "periodName", default, deserialize_with = "lenient_text")]
    pub name: String,
}

impl Period {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Period {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Date encoded in the display name, if any
    pub fn date(&self) -> Option<NaiveDate> {
        period_date(&self.name)
    }
}

/// Extract the first year/month (and optional day) out of a period name.
///
/// Accepts "2024年3月", "2024年1-2月", "2024-03", "2024/3/15", "2024.03".
pub fn period_date(name: &str) -> Option<NaiveDate> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        // "1-2月" is a month range, not a day, hence the [^\d月] guard
        Regex::new(r"(\d{4})\s*(?:年|[-/.])\s*(\d{1,2})(?:月\s*(\d{1,2})\s*日|[-/.](\d{1,2})(?:[^\d月]|$))?")
            .expect("period date pattern is valid")
    });

    let caps = re.captures(name)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps
        .get(3)
        .or_else(|| caps.get(4))
        .and_then(|d| d.as_str().parse().ok())
        .unwrap_or(1);

    NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
}

/// Most recent period first. Periods whose name carries no date keep their
/// listing order and go after the dated ones.
pub fn sort_periods_desc(periods: &mut [Period]) {
    periods.sort_by(|a, b| match (a.date(), b.date()) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

// ============================================================================
// CATEGORY TREE
// ============================================================================

/// Node of the `getcategorytreelist` taxonomy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryNode {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable_vec")]
    pub children: Vec<CategoryNode>,
}

/// A leaf category, the unit that gets paginated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Category {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Keep only second-level nodes. Top-level nodes are structural and never
/// yield rows; a top-level node without children contributes nothing.
pub fn flatten_categories(tree: &[CategoryNode]) -> Vec<Category> {
    tree.iter()
        .flat_map(|top| top.children.iter())
        .map(|child| Category::new(child.id.clone(), child.name.clone()))
        .collect()
}

// ============================================================================
// PAGE
// ============================================================================

/// One row of the `all` endpoint. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    /// Item name
    #[serde(default, deserialize_with = "lenient_text")]
    pub mc: String,

    /// Specification
    #[serde(default, deserialize_with = "lenient_text")]
    pub gg: String,

    /// Unit
    #[serde(default, deserialize_with = "lenient_text")]
    pub dw: String,

    /// Price, kept as text (not guaranteed numeric upstream)
    #[serde(rename = "djSq", default, deserialize_with = "lenient_text")]
    pub dj_sq: String,
}

/// A bounded window of rows for one (period, category) pair
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub rows: Vec<PriceRow>,

    /// Raw `total` as sent by the server; see [`Page::total_count`]
    #[serde(default)]
    pub total: Option<Value>,
}

impl Page {
    /// Page with no rows and no total
    pub fn empty() -> Self {
        Page::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Server-side match count, when it is present and numeric.
    ///
    /// Integers, integral floats and numeric strings are accepted; anything
    /// else (absent, null, negative, text) yields `None`.
    pub fn total_count(&self) -> Option<u64> {
        match self.total.as_ref()? {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }
}

// ============================================================================
// PRICE RECORD (durable)
// ============================================================================

/// A row as persisted in `price_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub period_id: String,
    pub period_name: String,
    pub category_id: String,
    pub category_name: String,
    pub item_name: String,
    pub specification: String,
    pub unit: String,
    pub price: String,
    pub update_time: NaiveDateTime,
}

impl PriceRecord {
    pub fn from_row(
        period: &Period,
        category: &Category,
        row: &PriceRow,
        captured_at: NaiveDateTime,
    ) -> Self {
        PriceRecord {
            period_id: period.id.clone(),
            period_name: period.name.clone(),
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            item_name: row.mc.clone(),
            specification: row.gg.clone(),
            unit: row.dw.clone(),
            price: row.dj_sq.clone(),
            update_time: captured_at,
        }
    }
}

// ============================================================================
// LENIENT DESERIALIZERS
// ============================================================================

/// String, number or bool → text; null → ""
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

fn lenient_year<'de, D>(deserializer: D) -> Result<Year, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_i64().and_then(|y| Year::try_from(y).ok()),
        Value::String(s) => s.trim().parse::<Year>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| D::Error::custom(format!("invalid yearNum: {}", value)))
}

/// Absent or null array → empty
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// TESTS
// ============================================================================
