//! Canonical in-memory graph with first-seen node indices.

use std::collections::{HashMap, HashSet};

/// A community in the output, indexed by position in [`GraphOutput::nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNode {
    pub name: String,
    /// Display size derived from subscribers, see [`display_size`].
    pub size: u32,
}

/// Directed edge between two node indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLink {
    pub source: usize,
    pub target: usize,
    /// Remaining depth at discovery; a visual weight only.
    pub value: u32,
}

/// Nodes and deduplicated directed edges discovered by one generation call.
#[derive(Debug, Clone)]
pub struct GraphOutput {
    nodes: Vec<OutputNode>,
    index: HashMap<String, usize>,
    links: Vec<OutputLink>,
    edge_keys: HashSet<String>,
    default_node_size: u32,
}

/// `ceil(log10(subscribers))²`, or `default` when subscribers is 0.
pub fn display_size(subscribers: u64, default: u32) -> u32 {
    if subscribers == 0 {
        return default;
    }
    let magnitude = (subscribers as f64).log10().ceil();
    if !magnitude.is_finite() {
        return default;
    }
    (magnitude * magnitude) as u32
}

impl GraphOutput {
    pub fn new(default_node_size: u32) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            links: Vec::new(),
            edge_keys: HashSet::new(),
            default_node_size,
        }
    }

    /// Index of `name`, assigning the next one on first sight.
    pub fn register(&mut self, name: &str, subscribers: u64) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(OutputNode {
            name: name.to_string(),
            size: display_size(subscribers, self.default_node_size),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Record `source -> target` unless that ordered pair is already present.
    /// Returns whether the edge was new. Both indices must come from [`register`](Self::register).
    pub fn add_edge(&mut self, source: usize, target: usize, value: u32) -> bool {
        let (Some(from), Some(to)) = (self.nodes.get(source), self.nodes.get(target)) else {
            log::error!("Edge {} -> {} references an unregistered node", source, target);
            return false;
        };
        if !self.edge_keys.insert(edge_key(&from.name, &to.name)) {
            return false;
        }
        self.links.push(OutputLink { source, target, value });
        true
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edge_keys.contains(&edge_key(source, target))
    }

    pub fn nodes(&self) -> &[OutputNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[OutputLink] {
        &self.links
    }

    /// Edges as `(source name, target name)` in discovery order.
    pub fn named_edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.links.iter().map(move |link| {
            (
                self.nodes[link.source].name.as_str(),
                self.nodes[link.target].name.as_str(),
            )
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn edge_key(source: &str, target: &str) -> String {
    format!("{} -> {}", source, target)
}
