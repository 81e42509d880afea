//! Read-only access to the crawled community corpus.
//!
//! The graph builder only ever issues point lookups by name through
//! [`CorpusSource`]; the SQLite store is the production implementation and
//! [`MemoryCorpus`] backs tests and small fixtures.

mod memory;
mod sqlite;

pub use memory::MemoryCorpus;
pub use sqlite::{import_records, CrawledRecord, SqliteCorpus};

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RelsubsError, Result};

/// Placeholder the crawler writes when a description reference could not be parsed.
pub const LINK_ERROR_SENTINEL: &str = "error";

/// Which link list of a record a traversal follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    /// Follow down-links (communities this one references).
    Down,
    /// Follow up-links (communities that reference this one).
    Up,
}

impl LinkDirection {
    pub fn from_up(up: bool) -> Self {
        if up {
            LinkDirection::Up
        } else {
            LinkDirection::Down
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            LinkDirection::Down => LinkDirection::Up,
            LinkDirection::Up => LinkDirection::Down,
        }
    }
}

/// A single community as stored in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRecord {
    /// Lowercase community name, e.g. `python`.
    pub name: String,
    #[serde(default)]
    pub subscribers: u64,
    /// Adult-content flag.
    #[serde(default)]
    pub nsfw: bool,
    /// Communities whose descriptions reference this one.
    #[serde(default)]
    pub up_links: Vec<String>,
    /// Communities this one's description references.
    #[serde(default)]
    pub down_links: Vec<String>,
}

impl CommunityRecord {
    pub fn new(name: impl Into<String>, subscribers: u64) -> Self {
        Self {
            name: name.into(),
            subscribers,
            nsfw: false,
            up_links: Vec::new(),
            down_links: Vec::new(),
        }
    }

    pub fn links(&self, direction: LinkDirection) -> &[String] {
        match direction {
            LinkDirection::Down => &self.down_links,
            LinkDirection::Up => &self.up_links,
        }
    }
}

/// Point lookups against the corpus.
///
/// `Ok(None)` means the community is unknown (never crawled); `Err` is a
/// storage failure and aborts the calling generation.
pub trait CorpusSource {
    fn fetch(&self, name: &str) -> Result<Option<CommunityRecord>>;
}

impl<T: CorpusSource + ?Sized> CorpusSource for &T {
    fn fetch(&self, name: &str) -> Result<Option<CommunityRecord>> {
        (**self).fetch(name)
    }
}

/// True for link names the traversal must never follow.
pub fn is_placeholder_link(name: &str) -> bool {
    name.trim().is_empty() || name == LINK_ERROR_SENTINEL
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_]{1,64}$").expect("Invalid regex pattern"))
}

/// Normalize user input (`/r/Python `, `r/python`) to a corpus name and
/// reject anything that is not a plain community name.
pub fn normalize_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    let name = stripped.to_lowercase();
    validate_name(&name)?;
    Ok(name)
}

/// Names end up in artifact file names, so only `[a-z0-9_]` is accepted.
pub fn validate_name(name: &str) -> Result<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(RelsubsError::InvalidInput(format!(
            "'{}' is not a valid community name",
            name
        )))
    }
}
