use anyhow::{Context, Result};
use clap::Parser;
use relsubs::db::Db;
use relsubs::export::{export_full_graph, write_private_list, ContentMode};
use relsubs::{Config, SqliteCorpus};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "export")]
#[command(about = "Export the whole corpus link graph as DOT")]
struct Args {
    /// Drop link targets with fewer subscribers
    #[arg(long, default_value_t = 100)]
    min_subscribers: u64,

    #[arg(long, value_enum, default_value_t = ContentMode::Censored)]
    mode: ContentMode,

    /// Output file (default: `<output_dir>/<mode>.gv`)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let corpus = SqliteCorpus::open(&Db::new(config.db_path()))?;
    let export = export_full_graph(&corpus, args.min_subscribers, args.mode)?;

    let output = args
        .output
        .unwrap_or_else(|| config.output_dir().join(format!("{}.gv", args.mode.file_stem())));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, &export.dot)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} edges to {}", export.edges, output.display());

    let private_path = output
        .parent()
        .map(|p| p.join("private_subs.txt"))
        .unwrap_or_else(|| PathBuf::from("private_subs.txt"));
    let private = write_private_list(&corpus, &private_path)?;
    println!("Wrote {} private communities to {}", private, private_path.display());

    Ok(())
}
