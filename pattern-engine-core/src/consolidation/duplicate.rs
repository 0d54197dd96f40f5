//! Duplicate detection: cluster near-identical patterns via union-find
//! over `all_pairs(merge_threshold)`, then propose a keep-best merge per
//! cluster.

use std::collections::HashMap;
use uuid::Uuid;

use crate::consolidation::health::HealthScore;
use crate::embeddings::EmbeddingIndex;

/// A proposed merge: keep `keeper`, archive/remove the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeProposal {
    pub keeper: Uuid,
    pub remove: Vec<Uuid>,
    pub max_similarity: f32,
}

struct UnionFind {
    parent: HashMap<Uuid, Uuid>,
}

impl UnionFind {
    fn new(ids: impl Iterator<Item = Uuid>) -> Self {
        Self {
            parent: ids.map(|id| (id, id)).collect(),
        }
    }

    fn find(&mut self, id: Uuid) -> Uuid {
        let parent = self.parent[&id];
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent.insert(id, root);
        root
    }

    fn union(&mut self, a: Uuid, b: Uuid) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

/// Cluster pattern ids into duplicate groups using `all_pairs(threshold)`
/// over the embedding index, via union-find. Clusters with only one
/// member are dropped (no duplication).
#[must_use]
pub fn find_duplicate_clusters(ids: &[Uuid], index: &EmbeddingIndex, threshold: f32) -> Vec<Vec<Uuid>> {
    if ids.is_empty() {
        return Vec::new();
    }
    let mut uf = UnionFind::new(ids.iter().copied());
    for (a, b, sim) in index.all_pairs(threshold) {
        if uf.parent.contains_key(&a) && uf.parent.contains_key(&b) {
            uf.union(a, b);
        }
        let _ = sim;
    }

    let mut clusters: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for id in ids {
        let root = uf.find(*id);
        clusters.entry(root).or_default().push(*id);
    }

    clusters.into_values().filter(|c| c.len() > 1).collect()
}

/// "keep-best" strategy: within a cluster, keep the member with the
/// highest health score; the rest become `remove`.
#[must_use]
pub fn keep_best_proposal(
    cluster: &[Uuid],
    health_scores: &HashMap<Uuid, HealthScore>,
    index: &EmbeddingIndex,
) -> Option<MergeProposal> {
    if cluster.len() < 2 {
        return None;
    }
    let keeper = *cluster
        .iter()
        .max_by(|a, b| {
            let sa = health_scores.get(a).map_or(0.0, |h| h.overall);
            let sb = health_scores.get(b).map_or(0.0, |h| h.overall);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        })?;
    let remove: Vec<Uuid> = cluster.iter().filter(|id| **id != keeper).copied().collect();
    let max_similarity = remove
        .iter()
        .map(|id| index.similarity(keeper, *id))
        .fold(0.0_f32, f32::max);

    Some(MergeProposal {
        keeper,
        remove,
        max_similarity,
    })
}
