use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use crate::error::{Result, RelsubsError};

/// Migration metadata
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get list of applied migrations
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
        .map_err(RelsubsError::Database)?;
    Ok(names)
}

/// `001_corpus_tables.sql` -> 1
fn parse_version(filename: &str) -> Result<u32> {
    let prefix = filename
        .split('_')
        .next()
        .filter(|p| !p.is_empty() && p.len() < filename.len())
        .ok_or_else(|| RelsubsError::Config(format!("Invalid migration filename: {}", filename)))?;
    prefix
        .parse()
        .map_err(|_| RelsubsError::Config(format!("Invalid migration version: {}", prefix)))
}

/// Load `NNN_name.sql` files from the migrations directory, ordered by version
fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let entries = fs::read_dir(migrations_dir).map_err(|e| {
        RelsubsError::Io(std::io::Error::new(
            e.kind(),
            format!("Cannot read migrations from {}: {}", migrations_dir.display(), e),
        ))
    })?;

    let mut migrations = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        // README and editor leftovers live next to the scripts
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }

        let filename = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RelsubsError::Config("Invalid migration filename".to_string()))?;

        migrations.push(Migration {
            version: parse_version(filename)?,
            name: filename.trim_end_matches(".sql").to_string(),
            sql: fs::read_to_string(&path)?,
        });
    }

    migrations.sort_by_key(|m| m.version);

    // version is the schema_migrations primary key
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(RelsubsError::Config(format!(
            "Migrations {} and {} share version {}",
            pair[0].name, pair[1].name, pair[0].version
        )));
    }

    Ok(migrations)
}

/// Run all pending migrations, each in its own transaction.
///
/// A failing script rolls back on its own; earlier ones stay applied.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    let mut pending = 0;

    for migration in load_migrations(migrations_dir)? {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;

        // execute_batch: scripts hold several statements
        tx.execute_batch(&migration.sql)
            .map_err(|e| {
                RelsubsError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("Failed to execute migration {}: {}", migration.name, e))
                ))
            })?;

        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;

        tx.commit()?;
        pending += 1;
    }

    if pending > 0 {
        log::info!("Applied {} corpus migration(s)", pending);
    } else {
        log::debug!("Corpus schema up to date");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use std::fs;

    fn repo_migrations() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }

    #[test]
    fn test_migration_tracking() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        ensure_migrations_table(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![1, "001_test"],
        ).unwrap();

        let applied = get_applied_migrations(&conn).unwrap();
        assert!(applied.contains(&"001_test".to_string()));
    }

    #[test]
    fn test_load_migrations_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("002_another.sql"), "CREATE TABLE another (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("001_test.sql"), "CREATE TABLE test (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("README.txt"), "ignored").unwrap();

        let migrations = load_migrations(&migrations_dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[1].version, 2);
    }

    #[test]
    fn test_corpus_schema_and_idempotence() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        run_migrations(&mut conn, &repo_migrations()).unwrap();
        // second run is a no-op
        run_migrations(&mut conn, &repo_migrations()).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap();
        assert!(tables.contains(&"communities".to_string()));
        assert!(tables.contains(&"community_links".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let applied = get_applied_migrations(&conn).unwrap();
        assert_eq!(applied, vec!["001_corpus_tables", "002_link_indexes"]);
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        fs::write(temp_dir.path().join("001_b.sql"), "SELECT 1;").unwrap();
        assert!(matches!(
            load_migrations(temp_dir.path()),
            Err(RelsubsError::Config(msg)) if msg.contains("share version 1")
        ));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("002_link_indexes.sql").unwrap(), 2);
        assert!(parse_version("links.sql").is_err());
        assert!(parse_version("abc_links.sql").is_err());
    }

    #[test]
    fn test_failed_migration_rolls_back_alone() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        fs::write(migrations_dir.join("001_ok.sql"), "CREATE TABLE ok (id INTEGER);").unwrap();
        fs::write(
            migrations_dir.join("002_broken.sql"),
            "CREATE TABLE half (id INTEGER); NOT VALID SQL;",
        )
        .unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        assert!(run_migrations(&mut conn, &migrations_dir).is_err());
        assert_eq!(get_applied_migrations(&conn).unwrap(), vec!["001_ok"]);
        let half: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='half'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(half, 0);
    }
}
