use sha2::{Digest, Sha256};

/// Seeded, reproducible breadth limit over a candidate list.
///
/// Candidates are ranked by `SHA-256(seed ‖ name)`; the `max_children`
/// lowest-ranked are kept in their original corpus order.
#[derive(Debug, Clone, Default)]
pub struct BreadthSampler {
    max_children: Option<usize>,
    seed: u64,
}

impl BreadthSampler {
    pub fn new(max_children: Option<usize>, seed: u64) -> Self {
        Self { max_children, seed }
    }

    /// Sampler that keeps every candidate.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn select<'c>(&self, candidates: &'c [String]) -> Vec<&'c str> {
        let limit = match self.max_children {
            Some(limit) if candidates.len() > limit => limit,
            _ => return candidates.iter().map(String::as_str).collect(),
        };

        let mut ranked: Vec<(usize, [u8; 32])> = candidates
            .iter()
            .enumerate()
            .map(|(pos, name)| (pos, self.rank(name)))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked.sort_by_key(|(pos, _)| *pos);

        ranked
            .into_iter()
            .map(|(pos, _)| candidates[pos].as_str())
            .collect()
    }

    fn rank(&self, name: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(name.as_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        digest
    }
}
