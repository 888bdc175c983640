use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::Path;

use pos_reconcile::{
    ingest_upload, logging, open_database, store_summary, ledger_balance, AppConfig, UploadType,
};

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = env::args().collect();
    let config = AppConfig::from_env()?;

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let (upload_type, file) = match (args.get(2), args.get(3)) {
                (Some(upload_type), Some(file)) => (upload_type, file),
                _ => {
                    print_usage();
                    bail!("import needs an upload type and a file");
                }
            };
            let upload_type: UploadType = upload_type.parse().map_err(anyhow::Error::msg)?;
            run_import(&config, upload_type, Path::new(file))
        }
        Some("summary") => run_summary(&config),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("pos-reconcile {}", pos_reconcile::VERSION);
    println!();
    println!("Usage:");
    println!("  pos-reconcile import <orders|payments|transactions> <file.csv>");
    println!("  pos-reconcile summary");
}

fn run_import(config: &AppConfig, upload_type: UploadType, file: &Path) -> Result<()> {
    println!("📥 {} import", upload_type);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file.file_name().map(|name| name.to_string_lossy().into_owned());

    let mut conn = open_database(&config.database_path)?;
    println!("✓ Database: {}", config.database_path.display());

    let summary = ingest_upload(&mut conn, upload_type, filename.as_deref(), &bytes, &config.ingest)
        .with_context(|| format!("Import of {} failed", file.display()))?;

    println!("✓ Decoded as {}", summary.encoding.label());
    for pass in &summary.report.passes {
        println!(
            "  {:<13} {:>6} processed  {:>5} skipped  {:>5} failed",
            pass.pass.as_str(),
            pass.processed,
            pass.skipped,
            pass.failed()
        );
        for issue in pass.errors.iter().chain(pass.skipped_rows.iter()) {
            println!(
                "    line {:>5} {:<12} {}",
                issue.line,
                issue.key.as_deref().unwrap_or("-"),
                issue.message
            );
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if summary.report.total_errors() == 0 {
        println!("✅ {}", summary.message());
    } else {
        println!("⚠️  {}", summary.message());
    }

    Ok(())
}

fn run_summary(config: &AppConfig) -> Result<()> {
    let conn = open_database(&config.database_path)?;

    let summary = store_summary(&conn)?;
    let balance = ledger_balance(&conn, None, None)?;

    println!("📊 {}", config.database_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Customers:     {}", summary.customers);
    println!("  Orders:        {}", summary.orders);
    println!("  Transactions:  {} ({} manual)", summary.transactions, summary.manual_transactions);
    println!("  Income:        {:.2}", balance.income);
    println!("  Expense:       {:.2}", balance.expense);
    println!("  Net:           {:.2}", balance.net);

    Ok(())
}
