//! Recursive bidirectional traversal over community links.

use std::collections::HashSet;

use log::Level;

use crate::cache::LookupCache;
use crate::corpus::{is_placeholder_link, CommunityRecord, CorpusSource, LinkDirection};
use crate::error::Result;
use crate::graph::{BreadthSampler, GraphOutput};

/// Per-call traversal parameters.
#[derive(Debug, Clone)]
pub struct TraversalSettings {
    /// Configured max depth `D`; the pruning distance is `D / remaining`.
    pub max_depth: u32,
    pub allow_nsfw: bool,
    /// Fraction of the parent's subscribers a child must reach, per unit of distance.
    pub prune_ratio: f64,
    /// Log each discovered edge at info instead of debug.
    pub verbose: bool,
}

/// Counters for one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub edges_added: usize,
    /// Distinct adult-flagged communities whose subtree was pruned.
    pub censored: usize,
}

/// State owned by a single generation call: visitation sets, censor set and
/// the graph being assembled. Lookups go through the shared [`LookupCache`].
pub struct TraversalContext<'a, C: CorpusSource + ?Sized> {
    corpus: &'a C,
    cache: &'a mut LookupCache,
    sampler: &'a BreadthSampler,
    settings: TraversalSettings,
    visited_down: HashSet<String>,
    visited_up: HashSet<String>,
    censored: HashSet<String>,
    graph: GraphOutput,
}

impl<'a, C: CorpusSource + ?Sized> TraversalContext<'a, C> {
    pub fn new(
        corpus: &'a C,
        cache: &'a mut LookupCache,
        sampler: &'a BreadthSampler,
        settings: TraversalSettings,
        default_node_size: u32,
    ) -> Self {
        Self {
            corpus,
            cache,
            sampler,
            settings,
            visited_down: HashSet::new(),
            visited_up: HashSet::new(),
            censored: HashSet::new(),
            graph: GraphOutput::new(default_node_size),
        }
    }

    pub fn resolve(&mut self, name: &str) -> Result<Option<CommunityRecord>> {
        self.cache.resolve(self.corpus, name)
    }

    /// Expand `name` with `depth` hops remaining.
    ///
    /// `up` selects up-links instead of down-links; `reverse` flips that
    /// choice for this call only, so a pass can ascend to a referrer and then
    /// descend from it. Children always continue in the effective direction.
    pub fn add_edges(&mut self, name: &str, depth: u32, up: bool, reverse: bool) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }

        let Some(record) = self.resolve(name)? else {
            return Ok(());
        };

        let mut direction = LinkDirection::from_up(up);
        if reverse {
            direction = direction.flipped();
        }

        if self.has_visited(name, direction) {
            return Ok(());
        }

        if self.is_censored(&record) {
            self.censor(name);
            return Ok(());
        }

        self.visited_mut(direction).insert(name.to_string());

        let hop = self.settings.max_depth.saturating_sub(depth);
        let distance = f64::from(self.settings.max_depth) / f64::from(depth);
        let threshold = record.subscribers as f64 * self.settings.prune_ratio * distance;
        let level = if self.settings.verbose { Level::Info } else { Level::Debug };

        log::log!(level, "Expanding {} ({:?}, depth {})", name, direction, depth);

        for child in self.candidates(&record, direction)? {
            let child_name = child.name.as_str();

            if self.is_censored(&child) {
                self.censor(child_name);
                continue;
            }

            // Seed neighbors are never pruned; farther out the bar rises with distance.
            if hop != 0 && (child.subscribers as f64) < threshold {
                log::trace!(
                    "Pruned {} ({} subscribers < {:.1})",
                    child_name,
                    child.subscribers,
                    threshold
                );
                continue;
            }

            let (source, target) = match direction {
                LinkDirection::Up => (&child, &record),
                LinkDirection::Down => (&record, &child),
            };
            let source_idx = self.graph.register(&source.name, source.subscribers);
            let target_idx = self.graph.register(&target.name, target.subscribers);
            if self.graph.add_edge(source_idx, target_idx, depth) {
                log::log!(level, "{} -> {}", source.name, target.name);
            }

            self.add_edges(child_name, depth - 1, direction == LinkDirection::Up, false)?;
        }

        Ok(())
    }

    /// Resolvable children of `record`, narrowed by the breadth sampler.
    /// Placeholders and unknown names never take a sampling slot.
    fn candidates(
        &mut self,
        record: &CommunityRecord,
        direction: LinkDirection,
    ) -> Result<Vec<CommunityRecord>> {
        let mut resolved = Vec::new();
        for link in record.links(direction) {
            if is_placeholder_link(link) {
                continue;
            }
            if let Some(child) = self.resolve(link)? {
                resolved.push(child);
            }
        }

        let names: Vec<String> = resolved.iter().map(|c| c.name.clone()).collect();
        let kept: HashSet<&str> = self.sampler.select(&names).into_iter().collect();
        if kept.len() == names.len() {
            return Ok(resolved);
        }
        Ok(resolved
            .into_iter()
            .filter(|c| kept.contains(c.name.as_str()))
            .collect())
    }

    fn is_censored(&self, record: &CommunityRecord) -> bool {
        record.nsfw && !self.settings.allow_nsfw
    }

    fn censor(&mut self, name: &str) {
        if self.censored.insert(name.to_string()) {
            log::debug!("Censored {}", name);
        }
    }

    pub fn has_visited(&self, name: &str, direction: LinkDirection) -> bool {
        match direction {
            LinkDirection::Down => self.visited_down.contains(name),
            LinkDirection::Up => self.visited_up.contains(name),
        }
    }

    fn visited_mut(&mut self, direction: LinkDirection) -> &mut HashSet<String> {
        match direction {
            LinkDirection::Down => &mut self.visited_down,
            LinkDirection::Up => &mut self.visited_up,
        }
    }

    pub fn stats(&self) -> TraversalStats {
        TraversalStats {
            edges_added: self.graph.edge_count(),
            censored: self.censored.len(),
        }
    }

    pub fn graph(&self) -> &GraphOutput {
        &self.graph
    }

    pub fn into_graph(self) -> GraphOutput {
        self.graph
    }
}
