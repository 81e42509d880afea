use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, RelsubsError};

const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536;";

/// Database connection wrapper
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with optimized pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(RelsubsError::Database)?;

        // WAL so the import binary can write while generators read
        conn.execute_batch(PRAGMAS)?;

        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)
                .map_err(RelsubsError::Database)?;
            conn.execute_batch(PRAGMAS)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RelsubsError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("database task failed: {}", e),
        )))?
    }
}

pub mod migrate;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                .map_err(RelsubsError::Database)?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let conn = db.open_connection().unwrap();

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(journal_mode.to_uppercase(), "WAL");

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(foreign_keys, 1);
    }
}
