// Price Crawler - Core Library
// Exposes all modules for use in the crawler CLI, the export utility, and tests

pub mod config;
pub mod models;
pub mod client;     // Remote Tree Client - portal endpoints
pub mod traversal;  // Traversal Engine - year → period → category
pub mod sink;       // Persistence Sinks - counting / row store
pub mod db;
pub mod report;     // Audit report (JSON + console tables)

// Only compile the spreadsheet exporter when the export feature is enabled
#[cfg(feature = "export")]
pub mod export;

// Re-export commonly used types
pub use config::{
    Cli, Command, CrawlConfig, PortalConfig,
    init_tracing,
    AUDIT_PAGE_SIZE, COLLECTION_PAGE_SIZE, DEFAULT_DB_FILE, DEFAULT_REPORT_FILE,
};
pub use models::{
    Category, CategoryNode, Page, Period, PriceRecord, PriceRow, Year,
    flatten_categories, sort_periods_desc, sort_years_desc,
};
pub use client::{FetchError, HttpTreeClient, PriceTreeSource};
pub use traversal::{CrawlMode, FetchFailurePolicy, Traversal, TraversalSummary};
pub use sink::{AuditCounts, CountingSink, PageSink, RowStoreSink};
pub use db::{
    open_store, setup_database, insert_price_records,
    get_price_records, count_records, list_tables,
};
pub use report::{AuditReport, render_period_details, render_year_summary};
#[cfg(feature = "export")]
pub use export::{ExportError, ExportSummary, export_to_csv, export_to_xlsx};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
