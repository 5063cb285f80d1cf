use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use rusqlite::Connection;

use price_crawler::{
    count_records, init_tracing, open_store, render_period_details, render_year_summary,
    AuditReport, Cli, CountingSink, CrawlConfig, HttpTreeClient, PortalConfig, RowStoreSink,
    Traversal,
};
use price_crawler::{Command, CrawlMode};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let portal = cli.portal();
    let config = cli.crawl_config();

    match cli.command {
        Command::Collect(_) => run_collect(portal, &config),
        Command::Audit(_) => run_audit(portal, &config),
    }
}

fn connect(portal: PortalConfig, config: &CrawlConfig) -> Result<HttpTreeClient> {
    let client = HttpTreeClient::new(portal, config.timeout)?;
    client
        .open_session()
        .with_context(|| format!("Failed to open a session on {}", client.portal().index_url()))?;
    Ok(client)
}

fn traversal_for(config: &CrawlConfig) -> Traversal {
    Traversal::new(config.mode)
        .with_page_size(config.page_size)
        .with_policy(config.policy)
}

fn run_collect(portal: PortalConfig, config: &CrawlConfig) -> Result<()> {
    println!("🗄️  Collecting price records");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Open store
    let mut conn: Connection = open_store(&config.db_path)?;
    let before = count_records(&conn)?;
    println!("✓ Store {} holds {} records", config.db_path.display(), before);

    // 2. Crawl
    let mut client = connect(portal, config)?;
    let traversal = traversal_for(config);
    let (summary, inserted) = {
        let mut sink = RowStoreSink::new(&mut conn);
        let summary = traversal.run(&mut client, &mut sink)?;
        (summary, sink.inserted())
    };

    // 3. Verify
    let after = count_records(&conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ Visited {} years, {} periods, {} categories ({} pages)",
        summary.years, summary.periods, summary.categories, summary.pages
    );
    println!("✓ Inserted: {} records", inserted);
    println!("✓ Store now holds {} records", after);
    if summary.fetch_failures > 0 {
        println!("⚠️  {} remote calls failed (policy: {:?})", summary.fetch_failures, config.policy);
    }

    Ok(())
}

fn run_audit(portal: PortalConfig, config: &CrawlConfig) -> Result<()> {
    debug_assert_eq!(config.mode, CrawlMode::Audit);
    println!("🔍 Auditing record counts per category");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut client = connect(portal, config)?;
    let mut sink = CountingSink::new();
    let summary = traversal_for(config).run(&mut client, &mut sink)?;
    let counts = sink.into_counts();

    println!("\n{}", "=".repeat(80));
    println!("Record counts by year");
    println!("{}", "=".repeat(80));
    print!("{}", render_year_summary(&counts));

    if let Some(latest) = counts.years().into_iter().max() {
        println!("\nPeriods of {}", latest);
        print!("{}", render_period_details(&counts, latest));
    }

    let report = AuditReport::from_counts(&counts, Local::now().naive_local());
    report.write_json(&config.report_path)?;

    println!("\n{}", "=".repeat(80));
    println!(
        "✓ {} categories checked, {} records across all years",
        summary.categories,
        counts.total_all_years()
    );
    println!("✓ Report saved to {}", config.report_path.display());

    Ok(())
}
