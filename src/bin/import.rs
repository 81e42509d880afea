use anyhow::{Context, Result};
use clap::Parser;
use relsubs::corpus::{import_records, CrawledRecord};
use relsubs::db::{migrate, Db};
use relsubs::Config;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Load a crawler dump (JSON array of community records) into the corpus database")]
struct Args {
    /// Crawler dump to import
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    log::info!("Database path: {}", config.db_path().display());

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let records: Vec<CrawledRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", args.input.display()))?;
    log::info!("Read {} records from {}", records.len(), args.input.display());

    let start = Instant::now();
    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    let imported = db
        .with_connection(move |conn| {
            migrate::run_migrations(conn, migrations_dir)?;
            import_records(conn, &records)
        })
        .await?;

    log::info!(
        "Imported {} communities in {:.2}s",
        imported,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
