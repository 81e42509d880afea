use anyhow::Result;
use clap::{Parser, Subcommand};
use relsubs::cache::LookupCache;
use relsubs::corpus::normalize_name;
use relsubs::db::{migrate, Db};
use relsubs::server::GraphServer;
use relsubs::{
    Config, GenerationOutcome, GraphRequest, Recommender, RecommenderSettings, RelsubsError,
    SqliteCorpus,
};
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "relsubs")]
#[command(about = "Related-communities graph generator", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the graph artifacts for one seed community
    Generate {
        /// Seed community (`python`, `r/python` and `/r/Python/` are equivalent)
        seed: String,
        /// Traversal depth, clamped to graph.depth_limit
        #[arg(short, long)]
        depth: Option<u32>,
        /// Include adult-flagged communities
        #[arg(long)]
        nsfw: bool,
        /// Also render the DOT file with Graphviz
        #[arg(long)]
        render: bool,
        /// Log every traversal step
        #[arg(short, long)]
        verbose: bool,
    },
    /// Serve `/graph` over HTTP
    Serve,
    /// Verify the corpus schema and report cache state
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let verbose = matches!(cli.command, Some(Command::Generate { verbose: true, .. }));
    let level = if verbose { "debug" } else { config.relsubs.log_level.as_str() };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", level)).init();

    match cli.command.unwrap_or(Command::Verify) {
        Command::Generate {
            seed,
            depth,
            nsfw,
            render,
            verbose,
        } => {
            let request = GraphRequest::new(
                normalize_name(&seed)?,
                depth.unwrap_or(config.graph.default_depth),
            )
            .with_nsfw(nsfw || config.graph.allow_nsfw)
            .with_render(render)
            .with_verbose(verbose);
            run_generate(&config, request).await?;
        }
        Command::Serve => run_http_server(&config).await?,
        Command::Verify => run_schema_verification(&config).await?,
    }

    Ok(())
}

/// Migrate the corpus and build a recommender over it
async fn build_recommender(config: &Config) -> Result<Recommender<SqliteCorpus>> {
    let db = Db::new(config.db_path());

    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;
    log::info!("Corpus database ready: {}", config.db_path().display());

    let corpus = SqliteCorpus::open(&db)?;
    let mut cache = LookupCache::load(config.cache_path(), config.cache.capacity)?;
    if config.cache.retry_missing {
        let dropped = cache.forget_missing();
        log::info!("Dropped {} cached misses", dropped);
    }
    log::info!(
        "Lookup cache: {} entries from {}",
        cache.len(),
        config.cache_path().display()
    );

    Ok(Recommender::new(
        corpus,
        cache,
        RecommenderSettings::from_config(config),
    ))
}

async fn run_generate(config: &Config, request: GraphRequest) -> Result<()> {
    let mut recommender = build_recommender(config).await?;

    let outcome = tokio::task::spawn_blocking(move || recommender.generate_graph(&request))
        .await
        .map_err(|e| RelsubsError::Internal(format!("generation task failed: {}", e)))??;

    println!("{}", outcome.status());
    match outcome {
        GenerationOutcome::Success(artifacts) => {
            println!("  json: {}", artifacts.paths.json.display());
            println!("  dot:  {}", artifacts.paths.dot.display());
            if let Some(image) = &artifacts.image {
                println!("  image: {}", image.display());
            }
            println!(
                "  {} nodes, {} edges, {} censored",
                artifacts.node_count, artifacts.stats.edges_added, artifacts.stats.censored
            );
            Ok(())
        }
        GenerationOutcome::Failure(reason) => anyhow::bail!("{}", reason),
    }
}

async fn run_http_server(config: &Config) -> Result<()> {
    log::info!("Starting relsubs HTTP server v{}", env!("CARGO_PKG_VERSION"));
    if !config.http_server.enabled {
        log::warn!("http_server.enabled is false; serving anyway because `serve` was requested");
    }

    let recommender = build_recommender(config).await?;
    let server = GraphServer::new(recommender, config);
    server.run(config.http_server.port).await?;

    Ok(())
}

async fn run_schema_verification(config: &Config) -> Result<()> {
    log::info!("Starting relsubs v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Output directory: {}", config.output_dir().display());

    let db = Db::new(config.db_path());
    let migrations_dir = Path::new("migrations");
    db.with_connection(|conn| migrate::run_migrations(conn, migrations_dir))
        .await?;

    verify_database_schema(&db).await?;

    let cache = LookupCache::load(config.cache_path(), config.cache.capacity)?;
    log::info!(
        "Lookup cache: {} entries at {}",
        cache.len(),
        config.cache_path().display()
    );

    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let expected_tables = ["communities", "community_links", "schema_migrations"];
        let mut all_tables_exist = true;
        for table in &expected_tables {
            if tables.iter().any(|t| t == table) {
                log::debug!("✓ Table exists: {}", table);
            } else {
                log::error!("Missing table: {}", table);
                all_tables_exist = false;
            }
        }
        if !all_tables_exist {
            return Err(RelsubsError::Config(
                "Not all required tables exist".to_string(),
            ));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let communities: i64 =
            conn.query_row("SELECT COUNT(*) FROM communities", [], |row| row.get(0))?;
        let links: i64 =
            conn.query_row("SELECT COUNT(*) FROM community_links", [], |row| row.get(0))?;
        log::info!("Corpus: {} communities, {} links", communities, links);
        if communities == 0 {
            log::warn!("Corpus is empty. Load a crawler dump with the `import` binary.");
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(RelsubsError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RelsubsError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
