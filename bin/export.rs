// Price Crawler - Export Utility
// Dumps SQLite tables into an .xlsx workbook (one sheet per table) or CSV files

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use price_crawler::{export_to_csv, export_to_xlsx, init_tracing, ExportError, DEFAULT_DB_FILE};

#[derive(Parser, Debug)]
#[command(name = "price-export")]
#[command(about = "Export SQLite tables to a spreadsheet workbook")]
#[command(version)]
struct Args {
    /// SQLite file to read
    #[arg(env = "PRICE_CRAWLER_DB", default_value = DEFAULT_DB_FILE)]
    db: PathBuf,

    /// Workbook path (defaults to the database path with .xlsx)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export only this table
    #[arg(short, long)]
    table: Option<String>,

    /// Write one CSV per table into this directory instead of a workbook
    #[arg(long, conflicts_with = "output")]
    csv_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    println!("📤 Exporting {}\n", args.db.display());

    let result = match &args.csv_dir {
        Some(dir) => export_to_csv(&args.db, dir, args.table.as_deref()),
        None => export_to_xlsx(&args.db, args.output.as_deref(), args.table.as_deref()),
    };

    match result {
        Ok(summary) => {
            for (table, rows) in &summary.tables {
                println!("✓ {}: {} rows", table, rows);
            }
            match summary.output {
                Some(path) => println!("\n✅ Export saved to {}", path.display()),
                None => println!("ℹ️  No tables found, nothing written"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(err: &ExportError) {
    eprintln!("❌ {}", err);

    match err {
        ExportError::MissingDatabase {
            current_dir,
            directory_listing,
            ..
        } => {
            if let Some(dir) = current_dir {
                eprintln!("   Current directory: {}", dir.display());
            }
            eprintln!("   Files here: {:?}", directory_listing);
        }
        ExportError::MissingTable { available, .. } => {
            eprintln!("   Tables in this database: {:?}", available);
        }
        other => {
            let mut source = std::error::Error::source(other);
            while let Some(cause) = source {
                eprintln!("   caused by: {}", cause);
                source = cause.source();
            }
        }
    }
}
