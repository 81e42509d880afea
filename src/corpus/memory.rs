//! HashMap-backed corpus used for fixtures and tests.

use std::cell::Cell;
use std::collections::HashMap;

use super::{CommunityRecord, CorpusSource};
use crate::error::Result;

/// In-memory corpus that counts how many point lookups it served.
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    records: HashMap<String, CommunityRecord>,
    lookups: Cell<usize>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from records whose `down_links` are authoritative,
    /// deriving every record's `up_links` by inverting them in input order.
    pub fn with_derived_up_links(records: Vec<CommunityRecord>) -> Self {
        let mut up: HashMap<String, Vec<String>> = HashMap::new();
        for record in &records {
            for link in &record.down_links {
                up.entry(link.clone()).or_default().push(record.name.clone());
            }
        }

        let mut corpus = Self::new();
        for mut record in records {
            record.up_links = up.remove(&record.name).unwrap_or_default();
            corpus.insert(record);
        }
        corpus
    }

    pub fn insert(&mut self, record: CommunityRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of `fetch` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

impl CorpusSource for MemoryCorpus {
    fn fetch(&self, name: &str) -> Result<Option<CommunityRecord>> {
        self.lookups.set(self.lookups.get() + 1);
        Ok(self.records.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, down: &[&str]) -> CommunityRecord {
        let mut r = CommunityRecord::new(name, 100);
        r.down_links = down.iter().map(|s| s.to_string()).collect();
        r
    }

    #[test]
    fn test_derived_up_links_follow_input_order() {
        let corpus = MemoryCorpus::with_derived_up_links(vec![
            record("a", &["c"]),
            record("b", &["c"]),
            record("c", &[]),
        ]);
        let c = corpus.fetch("c").unwrap().unwrap();
        assert_eq!(c.up_links, vec!["a".to_string(), "b".to_string()]);
        assert!(corpus.fetch("a").unwrap().unwrap().up_links.is_empty());
    }

    #[test]
    fn test_lookup_counter() {
        let corpus = MemoryCorpus::with_derived_up_links(vec![record("a", &[])]);
        assert_eq!(corpus.lookups(), 0);
        assert!(corpus.fetch("a").unwrap().is_some());
        assert!(corpus.fetch("missing").unwrap().is_none());
        assert_eq!(corpus.lookups(), 2);
        assert_eq!(corpus.len(), 1);
    }
}
