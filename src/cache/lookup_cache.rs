use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::corpus::{CommunityRecord, CorpusSource};
use crate::error::{RelsubsError, Result};

const CACHE_FORMAT_VERSION: u32 = 1;

/// Memoizes corpus point lookups across generation calls.
///
/// Both hits and misses are cached: a name that resolved to "not found" is
/// not looked up again until [`invalidate`](Self::invalidate) or
/// [`forget_missing`](Self::forget_missing) drops the negative entry.
/// The cache is unbounded unless a capacity is given, in which case the least
/// recently resolved names are evicted first.
pub struct LookupCache {
    entries: LruCache<String, Option<CommunityRecord>>,
    path: Option<PathBuf>,
    hits: u64,
    misses: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    saved_at: String,
    /// Least recently used first.
    entries: Vec<PersistedEntry>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    name: String,
    record: Option<CommunityRecord>,
}

impl LookupCache {
    /// Create an empty, unpersisted cache. `capacity == 0` means unbounded.
    pub fn new(capacity: usize) -> Self {
        let entries = match NonZeroUsize::new(capacity) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries,
            path: None,
            hits: 0,
            misses: 0,
        }
    }

    /// Load the cache persisted at `path`, or start empty if there is none.
    ///
    /// A blob that cannot be parsed is discarded with a warning; it is
    /// overwritten by the next [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut cache = Self::new(capacity);
        cache.path = Some(path.to_path_buf());

        if !path.exists() {
            log::info!("No lookup cache at {}, starting empty", path.display());
            return Ok(cache);
        }

        let raw = fs::read(path)?;
        let persisted: PersistedCache = match serde_json::from_slice(&raw) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Ignoring unreadable lookup cache {}: {}", path.display(), e);
                return Ok(cache);
            }
        };

        if persisted.version != CACHE_FORMAT_VERSION {
            log::warn!(
                "Ignoring lookup cache {} with format version {} (expected {})",
                path.display(),
                persisted.version,
                CACHE_FORMAT_VERSION
            );
            return Ok(cache);
        }

        for entry in persisted.entries {
            cache.entries.put(entry.name, entry.record);
        }
        log::info!(
            "Lookup cache loaded: {} entries (saved {})",
            cache.entries.len(),
            persisted.saved_at
        );
        Ok(cache)
    }

    /// Resolve `name`, consulting the corpus only on a cache miss.
    pub fn resolve<C: CorpusSource + ?Sized>(
        &mut self,
        corpus: &C,
        name: &str,
    ) -> Result<Option<CommunityRecord>> {
        if let Some(cached) = self.entries.get(name) {
            self.hits += 1;
            return Ok(cached.clone());
        }

        self.misses += 1;
        let record = corpus.fetch(name)?;
        self.entries.put(name.to_string(), record.clone());
        Ok(record)
    }

    /// Cached entry without touching recency; `None` when never resolved.
    pub fn peek(&self, name: &str) -> Option<&Option<CommunityRecord>> {
        self.entries.peek(name)
    }

    /// Drop one entry so the next resolve goes to the corpus.
    pub fn invalidate(&mut self, name: &str) -> bool {
        self.entries.pop(name).is_some()
    }

    /// Drop every negative entry. Returns how many were removed.
    pub fn forget_missing(&mut self) -> usize {
        let missing: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, record)| record.is_none())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &missing {
            self.entries.pop(name);
        }
        missing.len()
    }

    /// Persist to the path the cache was loaded from.
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_deref().ok_or_else(|| {
            RelsubsError::Config("lookup cache has no persistence path".to_string())
        })?;
        self.save_to(path)
    }

    /// Overwrite `path` with the full cache contents (temp file, then rename).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let persisted = PersistedCache {
            version: CACHE_FORMAT_VERSION,
            saved_at: Utc::now().to_rfc3339(),
            entries: self
                .entries
                .iter()
                .rev()
                .map(|(name, record)| PersistedEntry {
                    name: name.clone(),
                    record: record.clone(),
                })
                .collect(),
        };

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_vec(&persisted)?)?;
        fs::rename(&tmp_path, path)?;

        log::debug!("Lookup cache saved: {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves answered from memory since creation.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Resolves that went to the corpus since creation.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
