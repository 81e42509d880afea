//! SQLite-backed corpus: point lookups for the graph builder, bulk reads for
//! the full-corpus export, and the importer for crawler dumps.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use super::{CommunityRecord, CorpusSource};
use crate::db::Db;
use crate::error::{RelsubsError, Result};

/// Read-only view of the `communities` / `community_links` tables.
pub struct SqliteCorpus {
    conn: Connection,
}

impl SqliteCorpus {
    /// Open a dedicated connection to the corpus database
    pub fn open(db: &Db) -> Result<Self> {
        Ok(Self {
            conn: db.open_connection()?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn linked_names(&self, sql: &str, name: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let names = stmt
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .map_err(RelsubsError::Database)?;
        Ok(names)
    }

    /// Every (name, subscribers, nsfw) row, in name order.
    pub fn communities(&self) -> Result<Vec<(String, u64, bool)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, subscribers, nsfw FROM communities ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                let subscribers: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, subscribers.max(0) as u64, row.get::<_, bool>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .map_err(RelsubsError::Database)?;
        Ok(rows)
    }

    /// Every (source, target) link, grouped by source in down-link order.
    pub fn links(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT source, target FROM community_links ORDER BY source, position",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .map_err(RelsubsError::Database)?;
        Ok(rows)
    }

    /// Names whose crawl recorded the given access state (`private`, `banned`).
    pub fn communities_with_access(&self, access: &str) -> Result<Vec<String>> {
        self.linked_names(
            "SELECT name FROM communities WHERE access = ?1 ORDER BY name",
            access,
        )
    }
}

impl CorpusSource for SqliteCorpus {
    fn fetch(&self, name: &str) -> Result<Option<CommunityRecord>> {
        let row = self
            .conn
            .prepare_cached("SELECT subscribers, nsfw FROM communities WHERE name = ?1")?
            .query_row([name], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?)))
            .optional()?;

        let Some((subscribers, nsfw)) = row else {
            return Ok(None);
        };

        let down_links = self.linked_names(
            "SELECT target FROM community_links WHERE source = ?1 ORDER BY position",
            name,
        )?;
        let up_links = self.linked_names(
            "SELECT source FROM community_links WHERE target = ?1 ORDER BY rowid",
            name,
        )?;

        Ok(Some(CommunityRecord {
            name: name.to_string(),
            subscribers: subscribers.max(0) as u64,
            nsfw,
            up_links,
            down_links,
        }))
    }
}

/// One document of a crawler dump.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawledRecord {
    #[serde(alias = "_id")]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub subscribers: Option<u64>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub linked: Vec<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub created: Option<f64>,
}

impl CrawledRecord {
    fn is_community(&self) -> bool {
        self.kind.as_deref().map_or(true, |k| k == "subreddit")
    }
}

/// Upsert crawler records in one transaction. Names are lowercased, links are
/// deduplicated in first-seen order and self references are dropped.
/// Returns the number of communities written.
pub fn import_records(conn: &mut Connection, records: &[CrawledRecord]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut written = 0;

    for record in records.iter().filter(|r| r.is_community()) {
        let name = record.name.trim().to_lowercase();
        if name.is_empty() {
            log::warn!("Skipping crawler record with an empty name");
            continue;
        }

        tx.execute(
            r#"
            INSERT INTO communities (name, subscribers, nsfw, access, language, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(name) DO UPDATE SET
                subscribers = excluded.subscribers,
                nsfw = excluded.nsfw,
                access = excluded.access,
                language = excluded.language,
                created_utc = excluded.created_utc
            "#,
            params![
                name,
                record.subscribers.unwrap_or(0) as i64,
                record.adult,
                record.access,
                record.language,
                record.created,
            ],
        )?;

        tx.execute("DELETE FROM community_links WHERE source = ?1", params![name])?;

        let mut seen = HashSet::new();
        let mut position: i64 = 0;
        for link in &record.linked {
            let target = link.trim().to_lowercase();
            if target == name || !seen.insert(target.clone()) {
                continue;
            }
            tx.execute(
                "INSERT INTO community_links (source, target, position) VALUES (?1, ?2, ?3)",
                params![name, target, position],
            )?;
            position += 1;
        }

        written += 1;
    }

    tx.commit()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup_corpus(records_json: &str) -> (SqliteCorpus, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("corpus.db"));
        let mut conn = db.open_connection().unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        migrate::run_migrations(&mut conn, &migrations_dir).unwrap();
        let records: Vec<CrawledRecord> = serde_json::from_str(records_json).unwrap();
        import_records(&mut conn, &records).unwrap();
        (SqliteCorpus::from_connection(conn), temp_dir)
    }

    const DUMP: &str = r#"[
        {"_id": "python", "type": "subreddit", "subscribers": 500000,
         "linked": ["learnpython", "django", "learnpython", "python", "error", ""]},
        {"_id": "programming", "type": "subreddit", "subscribers": 900000,
         "linked": ["python", "rust"]},
        {"_id": "learnpython", "type": "subreddit", "subscribers": 200000, "linked": []},
        {"_id": "secret", "type": "subreddit", "linked": [], "access": "private"},
        {"_id": "spicy", "type": "subreddit", "subscribers": 1000, "adult": true, "linked": []},
        {"name": "backlog", "type": "backlog", "items": ["x"]}
    ]"#;

    #[test]
    fn test_fetch_known_record() {
        let (corpus, _temp) = setup_corpus(DUMP);
        let python = corpus.fetch("python").unwrap().unwrap();
        assert_eq!(python.subscribers, 500000);
        assert!(!python.nsfw);
        // duplicate and self reference dropped, placeholders kept for the traversal to skip
        assert_eq!(python.down_links, vec!["learnpython", "django", "error", ""]);
        assert_eq!(python.up_links, vec!["programming"]);
    }

    #[test]
    fn test_fetch_unknown_and_link_only_names() {
        let (corpus, _temp) = setup_corpus(DUMP);
        assert!(corpus.fetch("nonexistent").unwrap().is_none());
        // referenced but never crawled
        assert!(corpus.fetch("django").unwrap().is_none());
    }

    #[test]
    fn test_flags_and_access() {
        let (corpus, _temp) = setup_corpus(DUMP);
        assert!(corpus.fetch("spicy").unwrap().unwrap().nsfw);
        assert_eq!(corpus.fetch("secret").unwrap().unwrap().subscribers, 0);
        assert_eq!(corpus.communities_with_access("private").unwrap(), vec!["secret"]);
    }

    #[test]
    fn test_non_community_documents_skipped() {
        let (corpus, _temp) = setup_corpus(DUMP);
        assert!(corpus.fetch("backlog").unwrap().is_none());
        assert_eq!(corpus.communities().unwrap().len(), 5);
    }

    #[test]
    fn test_reimport_replaces_links() {
        let (corpus, _temp) = setup_corpus(DUMP);
        let mut conn = corpus.conn;
        let update: Vec<CrawledRecord> = serde_json::from_str(
            r#"[{"_id": "Python", "subscribers": 600000, "linked": ["Rust"]}]"#,
        )
        .unwrap();
        assert_eq!(import_records(&mut conn, &update).unwrap(), 1);
        let corpus = SqliteCorpus::from_connection(conn);
        let python = corpus.fetch("python").unwrap().unwrap();
        assert_eq!(python.subscribers, 600000);
        assert_eq!(python.down_links, vec!["rust"]);
        let links = corpus.links().unwrap();
        assert!(links.contains(&("python".to_string(), "rust".to_string())));
        assert!(!links.contains(&("python".to_string(), "django".to_string())));
    }
}
