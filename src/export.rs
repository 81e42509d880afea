//! Whole-corpus DOT export filtered by subscriber floor and content mode.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use clap::ValueEnum;

use crate::corpus::{is_placeholder_link, SqliteCorpus};
use crate::error::Result;
use crate::graph::DotWriter;

/// Which communities may appear as link targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContentMode {
    /// Every community.
    All,
    /// Hide adult-flagged communities.
    Censored,
    /// Only adult-flagged communities.
    Nsfw,
}

impl ContentMode {
    fn admits(self, nsfw: bool) -> bool {
        match self {
            ContentMode::All => true,
            ContentMode::Censored => !nsfw,
            ContentMode::Nsfw => nsfw,
        }
    }

    /// Default file stem for the exported graph.
    pub fn file_stem(self) -> &'static str {
        match self {
            ContentMode::All => "full",
            ContentMode::Censored => "censored",
            ContentMode::Nsfw => "nsfw",
        }
    }
}

/// Exported DOT text plus the number of edges it holds.
#[derive(Debug, Clone)]
pub struct FullGraphExport {
    pub dot: String,
    pub edges: usize,
}

/// Every corpus link whose target is known, admitted by `mode`, and has at
/// least `min_subscribers`, weighted by `log2(subscribers)`.
pub fn export_full_graph(
    corpus: &SqliteCorpus,
    min_subscribers: u64,
    mode: ContentMode,
) -> Result<FullGraphExport> {
    let communities: HashMap<String, (u64, bool)> = corpus
        .communities()?
        .into_iter()
        .map(|(name, subscribers, nsfw)| (name, (subscribers, nsfw)))
        .collect();

    let mut writer = DotWriter::new("G");
    let mut edges = 0;
    for (source, target) in corpus.links()? {
        if is_placeholder_link(&target) {
            continue;
        }
        let Some(&(subscribers, nsfw)) = communities.get(&target) else {
            continue;
        };
        if !mode.admits(nsfw) || subscribers < min_subscribers {
            continue;
        }
        let weight = if subscribers > 0 { (subscribers as f64).log2() } else { 0.0 };
        writer.edge(&source, &target, &[("weight", format!("{:.3}", weight))]);
        edges += 1;
    }

    log::info!(
        "Exported {} edges ({:?}, min {} subscribers)",
        edges,
        mode,
        min_subscribers
    );
    Ok(FullGraphExport {
        dot: writer.finish(),
        edges,
    })
}

/// Write one private community name per line. Returns how many were written.
pub fn write_private_list(corpus: &SqliteCorpus, path: &Path) -> Result<usize> {
    let names = corpus.communities_with_access("private")?;
    let mut body = names.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(path, body)?;
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{import_records, CrawledRecord};
    use crate::db::{migrate, Db};
    use tempfile::TempDir;

    fn setup() -> (SqliteCorpus, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("corpus.db"));
        let mut conn = db.open_connection().unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        migrate::run_migrations(&mut conn, &migrations_dir).unwrap();
        let records: Vec<CrawledRecord> = serde_json::from_str(
            r#"[
                {"_id": "python", "subscribers": 1024, "linked": ["rust", "spicy", "tiny", "uncrawled", "error"]},
                {"_id": "rust", "subscribers": 512, "linked": ["python"]},
                {"_id": "spicy", "subscribers": 4096, "adult": true, "linked": []},
                {"_id": "tiny", "subscribers": 3, "linked": []},
                {"_id": "hidden", "linked": [], "access": "private"},
                {"_id": "gone", "linked": [], "access": "banned"}
            ]"#,
        )
        .unwrap();
        import_records(&mut conn, &records).unwrap();
        (SqliteCorpus::from_connection(conn), temp_dir)
    }

    #[test]
    fn test_full_export_filters_by_subscribers() {
        let (corpus, _temp) = setup();
        let export = export_full_graph(&corpus, 100, ContentMode::All).unwrap();
        assert_eq!(export.edges, 3);
        assert!(export.dot.contains("\"python\" -> \"rust\" [weight=\"9.000\"]"));
        assert!(export.dot.contains("\"rust\" -> \"python\" [weight=\"10.000\"]"));
        assert!(export.dot.contains("\"python\" -> \"spicy\""));
        assert!(!export.dot.contains("\"tiny\""));
        assert!(!export.dot.contains("uncrawled"));
    }

    #[test]
    fn test_censored_and_nsfw_modes() {
        let (corpus, _temp) = setup();
        let censored = export_full_graph(&corpus, 100, ContentMode::Censored).unwrap();
        assert_eq!(censored.edges, 2);
        assert!(!censored.dot.contains("spicy"));

        let nsfw = export_full_graph(&corpus, 100, ContentMode::Nsfw).unwrap();
        assert_eq!(nsfw.edges, 1);
        assert!(nsfw.dot.contains("\"python\" -> \"spicy\""));
        assert_eq!(ContentMode::Nsfw.file_stem(), "nsfw");
    }

    #[test]
    fn test_private_list() {
        let (corpus, temp) = setup();
        let path = temp.path().join("private_subs.txt");
        assert_eq!(write_private_list(&corpus, &path).unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "hidden\n");
    }
}
