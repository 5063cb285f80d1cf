// 🕸️ Traversal Engine - year → period → category walk with pagination
//
// Strictly sequential: one remote call at a time, in tree order. Every page
// obtained is handed to the sink before the next call is made, so a killed
// run leaves exactly the pages the sink already committed.
//
// Per category:
//   FETCHING(1) → [rows] → PERSISTING → FETCHING(n+1)
//   FETCHING(n) → [no rows] → DONE
// Audit mode stops after the first probe whatever it returns.

use crate::client::{FetchError, PriceTreeSource};
use crate::config::{AUDIT_PAGE_SIZE, COLLECTION_PAGE_SIZE};
use crate::models::{Category, Page, Period, Year};
use crate::sink::PageSink;
use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::{info, warn};

// ============================================================================
// MODES & POLICIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// One small probe per category; only `total` matters
    Audit,

    /// Paginate every category until an empty page
    Collection,
}

impl CrawlMode {
    pub fn default_page_size(&self) -> u32 {
        match self {
            CrawlMode::Audit => AUDIT_PAGE_SIZE,
            CrawlMode::Collection => COLLECTION_PAGE_SIZE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMode::Audit => "audit",
            CrawlMode::Collection => "collection",
        }
    }
}

/// How a failed remote call is handled. Nothing is ever retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FetchFailurePolicy {
    /// Failed page → empty page handed to the sink (ends the category);
    /// failed listing → empty listing
    #[default]
    TreatAsEmpty,

    /// Failed page → category ends without the sink seeing that page;
    /// failed listing → subtree skipped
    SkipCategory,

    /// Any failure ends the run with an error
    AbortRun,
}

// ============================================================================
// SUMMARY
// ============================================================================

/// What one run visited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalSummary {
    pub years: usize,
    pub periods: usize,
    pub categories: usize,
    pub pages: usize,
    pub rows: usize,
    pub fetch_failures: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Traversal {
    mode: CrawlMode,
    page_size: u32,
    policy: FetchFailurePolicy,
}

impl Traversal {
    pub fn new(mode: CrawlMode) -> Self {
        Traversal {
            mode,
            page_size: mode.default_page_size(),
            policy: FetchFailurePolicy::default(),
        }
    }

    /// Builder pattern: override the rows requested per page
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Builder pattern: override the fetch-failure policy
    pub fn with_policy(mut self, policy: FetchFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> CrawlMode {
        self.mode
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn policy(&self) -> FetchFailurePolicy {
        self.policy
    }

    /// Walk the whole tree once, feeding every page to `sink`.
    ///
    /// Repeated (period, category) pairs in a listing are visited again;
    /// nothing is deduplicated here.
    pub fn run<S>(&self, source: &mut S, sink: &mut dyn PageSink) -> Result<TraversalSummary>
    where
        S: PriceTreeSource + ?Sized,
    {
        let mut summary = TraversalSummary::default();

        let years = self.listing("years", source.list_years(), &mut summary)?;
        info!(mode = self.mode.as_str(), years = ?years, "starting traversal");

        for year in years {
            summary.years += 1;

            let periods = self.listing(
                &format!("periods of {}", year),
                source.list_periods(year),
                &mut summary,
            )?;
            let names: Vec<&str> = periods.iter().map(|p| p.name.as_str()).collect();
            info!(year, periods = ?names, "year listed");

            for period in &periods {
                summary.periods += 1;
                info!(year, period = %period.name, period_id = %period.id, "processing period");

                let categories = self.listing(
                    &format!("categories of period {}", period.id),
                    source.list_categories(period),
                    &mut summary,
                )?;

                for category in &categories {
                    summary.categories += 1;
                    info!(category = %category.name, category_id = %category.id, "processing category");
                    self.walk_category(source, sink, year, period, category, &mut summary)?;
                }
            }
        }

        info!(
            years = summary.years,
            periods = summary.periods,
            categories = summary.categories,
            pages = summary.pages,
            rows = summary.rows,
            fetch_failures = summary.fetch_failures,
            "traversal finished"
        );

        Ok(summary)
    }

    fn walk_category<S>(
        &self,
        source: &mut S,
        sink: &mut dyn PageSink,
        year: Year,
        period: &Period,
        category: &Category,
        summary: &mut TraversalSummary,
    ) -> Result<()>
    where
        S: PriceTreeSource + ?Sized,
    {
        let mut page_index: u32 = 1;

        loop {
            let page = match source.fetch_page(period, category, page_index, self.page_size) {
                Ok(page) => page,
                Err(err) => {
                    summary.fetch_failures += 1;
                    match self.on_page_failure(err, period, category, page_index)? {
                        Some(page) => page,
                        None => return Ok(()),
                    }
                }
            };

            summary.pages += 1;
            summary.rows += page.rows.len();
            let exhausted = page.is_empty();

            sink.on_page(year, period, category, &page).with_context(|| {
                format!(
                    "Failed to handle page {} of {} / {}",
                    page_index, period.name, category.name
                )
            })?;

            if exhausted || self.mode == CrawlMode::Audit {
                return Ok(());
            }
            page_index += 1;
        }
    }

    /// Some(page) to hand on, None to end the category, Err to end the run
    fn on_page_failure(
        &self,
        err: FetchError,
        period: &Period,
        category: &Category,
        page_index: u32,
    ) -> Result<Option<Page>> {
        match self.policy {
            FetchFailurePolicy::TreatAsEmpty => {
                warn!(period = %period.name, category = %category.name, page = page_index, error = %err, "page fetch failed, treating as empty");
                Ok(Some(Page::empty()))
            }
            FetchFailurePolicy::SkipCategory => {
                warn!(period = %period.name, category = %category.name, page = page_index, error = %err, "page fetch failed, skipping category");
                Ok(None)
            }
            FetchFailurePolicy::AbortRun => Err(anyhow::Error::new(err).context(format!(
                "Failed to fetch page {} of {} / {}",
                page_index, period.name, category.name
            ))),
        }
    }

    fn listing<T>(
        &self,
        what: &str,
        result: Result<Vec<T>, FetchError>,
        summary: &mut TraversalSummary,
    ) -> Result<Vec<T>> {
        match result {
            Ok(items) => Ok(items),
            Err(err) => {
                summary.fetch_failures += 1;
                match self.policy {
                    FetchFailurePolicy::AbortRun => {
                        Err(anyhow::Error::new(err).context(format!("Failed to list {}", what)))
                    }
                    FetchFailurePolicy::TreatAsEmpty | FetchFailurePolicy::SkipCategory => {
                        warn!(error = %err, "failed to list {}, nothing to do there", what);
                        Ok(Vec::new())
                    }
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
