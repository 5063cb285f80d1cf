// ⚙️ Configuration - portal endpoints, crawl settings and command line
//
// Defaults target the Shenzhen construction cost portal. Base URL and store
// path can be overridden on the command line or through the environment.

use crate::traversal::{CrawlMode, FetchFailurePolicy};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DEFAULT_BASE_URL: &str = "https://zjj.sz.gov.cn";
pub const INDEX_PATH: &str = "/szzjxx/web/pc/index";
pub const API_PREFIX: &str = "/szzjxx/priceinfo/pc/";

/// Rows requested per page when collecting records
pub const COLLECTION_PAGE_SIZE: u32 = 100;

/// Rows requested by the single audit probe (only `total` is read)
pub const AUDIT_PAGE_SIZE: u32 = 10;

pub const DEFAULT_DB_FILE: &str = "sz_price_info.db";
pub const DEFAULT_REPORT_FILE: &str = "sz_price_real_data_count_verification.json";

/// Spreadsheet sheet titles are limited to 31 characters
pub const SHEET_NAME_LIMIT: usize = 31;

// ============================================================================
// PORTAL
// ============================================================================

/// Where the portal lives and how its endpoints are addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub base_url: String,
    pub index_path: String,
    pub api_prefix: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig::new(DEFAULT_BASE_URL)
    }
}

impl PortalConfig {
    pub fn new(base_url: &str) -> Self {
        PortalConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            index_path: INDEX_PATH.to_string(),
            api_prefix: API_PREFIX.to_string(),
        }
    }

    /// Page fetched to open the cookie session
    pub fn index_url(&self) -> String {
        format!("{}{}", self.base_url, self.index_path)
    }

    /// Full URL of an AJAX endpoint (`yearinfo`, `all`, ...)
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.api_prefix.trim_matches('/'),
            endpoint
        )
    }
}

// ============================================================================
// CRAWL SETTINGS
// ============================================================================

/// Everything one crawl run needs besides the portal address
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub mode: CrawlMode,
    pub page_size: u32,
    pub policy: FetchFailurePolicy,
    pub db_path: PathBuf,
    pub report_path: PathBuf,
    pub timeout: Option<Duration>,
}

impl CrawlConfig {
    pub fn new(mode: CrawlMode) -> Self {
        CrawlConfig {
            mode,
            page_size: mode.default_page_size(),
            policy: FetchFailurePolicy::default(),
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            report_path: PathBuf::from(DEFAULT_REPORT_FILE),
            timeout: None,
        }
    }
}

// ============================================================================
// COMMAND LINE
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "price-crawler")]
#[command(about = "Crawl the construction price portal into SQLite, or audit its record counts")]
#[command(version)]
pub struct Cli {
    /// Portal base URL
    #[arg(long, env = "PRICE_CRAWLER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout in seconds (HTTP client default when omitted)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Persist every price record into the store
    Collect(CollectArgs),

    /// Count records per category and write a JSON report
    Audit(AuditArgs),
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// SQLite store to append to
    #[arg(long, env = "PRICE_CRAWLER_DB", default_value = DEFAULT_DB_FILE)]
    pub db: PathBuf,

    #[arg(long, default_value_t = COLLECTION_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: u32,

    /// What to do when a remote call fails
    #[arg(long, value_enum, default_value_t = FetchFailurePolicy::TreatAsEmpty)]
    pub on_fetch_error: FetchFailurePolicy,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Where to write the JSON report
    #[arg(long, default_value = DEFAULT_REPORT_FILE)]
    pub report: PathBuf,

    #[arg(long, default_value_t = AUDIT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub page_size: u32,

    #[arg(long, value_enum, default_value_t = FetchFailurePolicy::TreatAsEmpty)]
    pub on_fetch_error: FetchFailurePolicy,
}

impl Cli {
    pub fn portal(&self) -> PortalConfig {
        PortalConfig::new(&self.base_url)
    }

    /// Resolve the subcommand into a crawl configuration
    pub fn crawl_config(&self) -> CrawlConfig {
        let timeout = self.timeout_secs.map(Duration::from_secs);
        match &self.command {
            Command::Collect(args) => CrawlConfig {
                page_size: args.page_size,
                policy: args.on_fetch_error,
                db_path: args.db.clone(),
                timeout,
                ..CrawlConfig::new(CrawlMode::Collection)
            },
            Command::Audit(args) => CrawlConfig {
                page_size: args.page_size,
                policy: args.on_fetch_error,
                report_path: args.report.clone(),
                timeout,
                ..CrawlConfig::new(CrawlMode::Audit)
            },
        }
    }
}

/// Structured logs go to stderr so stdout stays free for reports.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
