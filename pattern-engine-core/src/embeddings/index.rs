//! C3: Embedding Index — a dense matrix of unit-length vectors keyed by
//! pattern id, plus cosine-similarity queries.

use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// A single row of the index.
#[derive(Debug, Clone)]
struct Row {
    vector: Vec<f32>,
    /// Content hash of the pattern at the time this vector was computed.
    content_hash_at_embed_time: String,
}

/// Cosine similarity between two vectors of equal length. Returns 0 for
/// mismatched lengths, empty vectors, or zero-norm vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Dense embedding index keyed by pattern id. Copy-on-write at row
/// granularity: `upsert` replaces a single row without touching the rest
/// of the matrix.
#[derive(Default)]
pub struct EmbeddingIndex {
    rows: RwLock<HashMap<Uuid, Row>>,
}

impl EmbeddingIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or insert) the row for `id`.
    pub fn upsert(&self, id: Uuid, vector: Vec<f32>, content_hash: impl Into<String>) {
        self.rows.write().insert(
            id,
            Row {
                vector,
                content_hash_at_embed_time: content_hash.into(),
            },
        );
    }

    pub fn remove(&self, id: Uuid) {
        self.rows.write().remove(&id);
    }

    /// Whether `id` has a row whose stored hash matches `current_hash`
    /// (i.e. is not stale).
    #[must_use]
    pub fn is_fresh(&self, id: Uuid, current_hash: &str) -> bool {
        self.rows
            .read()
            .get(&id)
            .is_some_and(|row| row.content_hash_at_embed_time == current_hash)
    }

    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.rows.read().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Cosine similarity between two rows. Returns 0.0 if either is absent.
    #[must_use]
    pub fn similarity(&self, a: Uuid, b: Uuid) -> f32 {
        let rows = self.rows.read();
        match (rows.get(&a), rows.get(&b)) {
            (Some(ra), Some(rb)) => cosine_similarity(&ra.vector, &rb.vector),
            _ => 0.0,
        }
    }

    /// Cosine similarity between an arbitrary query vector and row `id`.
    /// Returns 0.0 (per the staleness policy) if `id` has no row.
    #[must_use]
    pub fn similarity_to_query(&self, id: Uuid, query: &[f32]) -> f32 {
        self.rows
            .read()
            .get(&id)
            .map_or(0.0, |row| cosine_similarity(&row.vector, query))
    }

    /// Top-k ids by cosine similarity to `query`, descending.
    #[must_use]
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<(Uuid, f32)> {
        let rows = self.rows.read();
        let mut scored: Vec<(Uuid, f32)> = rows
            .iter()
            .map(|(id, row)| (*id, cosine_similarity(&row.vector, query)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Maximum cosine similarity between `id`'s row and any other row.
    /// Returns `None` if `id` is absent or there is no other row to
    /// compare against.
    #[must_use]
    pub fn max_similarity(&self, id: Uuid) -> Option<f32> {
        let rows = self.rows.read();
        let target = rows.get(&id)?;
        rows.iter()
            .filter(|(other_id, _)| **other_id != id)
            .map(|(_, row)| cosine_similarity(&target.vector, &row.vector))
            .fold(None, |acc, sim| Some(acc.map_or(sim, |m: f32| m.max(sim))))
    }

    /// Every pair `(a, b, sim)` with `sim >= threshold` and `a < b` (by
    /// `Uuid` ordering, to avoid duplicate/symmetric pairs). O(n^2) upper
    /// bound.
    #[must_use]
    pub fn all_pairs(&self, threshold: f32) -> Vec<(Uuid, Uuid, f32)> {
        let rows = self.rows.read();
        let entries: Vec<(&Uuid, &Row)> = rows.iter().collect();
        let mut out = Vec::new();
        for i in 0..entries.len() {
            let (id_a, row_a) = entries[i];
            for entry_b in entries.iter().skip(i + 1) {
                let (id_b, row_b) = *entry_b;
                let sim = cosine_similarity(&row_a.vector, &row_b.vector);
                if sim >= threshold {
                    let (lo, hi) = if id_a < id_b {
                        (*id_a, *id_b)
                    } else {
                        (*id_b, *id_a)
                    };
                    out.push((lo, hi, sim));
                }
            }
        }
        out
    }
}
