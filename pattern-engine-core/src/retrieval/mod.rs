//! C5: Retriever (Injector) — scores the active pattern set against a
//! classified prompt and packs the best subset into a token budget.

pub mod render;
pub mod scoring;

use std::time::Duration;
use tracing::{debug, warn};

use crate::classifier::ClassifyInput;
use crate::config::{RetrievalConfig, SecurityConfig};
use crate::embeddings::{EmbeddingIndex, EmbeddingProvider};
use crate::pattern::{Pattern, PatternCache};
use crate::sanitizer::meets_minimum_trust;
use crate::tracker::EffectivenessTracker;

pub use scoring::AppliesContext;

/// A pattern selected by the retriever, with the score that ranked it.
#[derive(Debug, Clone)]
pub struct ScoredPattern {
    pub pattern: Pattern,
    pub score: f32,
}

/// Result of a single retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub selected: Vec<ScoredPattern>,
    pub artifact: String,
    /// True when the embedding channel fell back to keyword+applies only,
    /// per the graceful-outage behavior.
    pub degraded: bool,
}

/// Build an `AppliesContext` from a `ClassifyInput`'s derived hints.
fn build_applies_context(
    input: &ClassifyInput,
    classification: &crate::classifier::ClassificationResult,
) -> AppliesContext {
    AppliesContext {
        languages: classification.hints.probable_languages.clone(),
        frameworks: classification.hints.probable_frameworks.clone(),
        file_paths: input
            .file_context
            .recent_paths
            .iter()
            .filter_map(|p| p.to_str().map(str::to_string))
            .collect(),
        keywords: classification.keywords.clone(),
    }
}

/// Combines keyword, semantic, applies, maturity and effectiveness
/// channels into a relevance score and returns a budget-packed subset.
pub struct Retriever<'a> {
    cache: &'a PatternCache<'a>,
    index: &'a EmbeddingIndex,
    tracker: &'a EffectivenessTracker,
    provider: Option<&'a dyn EmbeddingProvider>,
    config: RetrievalConfig,
    security: SecurityConfig,
    embedding_timeout: Duration,
}

impl<'a> Retriever<'a> {
    #[must_use]
    pub fn new(
        cache: &'a PatternCache<'a>,
        index: &'a EmbeddingIndex,
        tracker: &'a EffectivenessTracker,
        provider: Option<&'a dyn EmbeddingProvider>,
        config: RetrievalConfig,
        security: SecurityConfig,
    ) -> Self {
        Self {
            cache,
            index,
            tracker,
            provider,
            config,
            security,
            embedding_timeout: Duration::from_secs(10),
        }
    }

    /// Retrieve a token-budgeted subset of patterns relevant to `input`,
    /// classified via [`crate::classifier::classify`], and record an
    /// injection event for each pattern included.
    pub fn retrieve(&self, input: &ClassifyInput, session_id: &str) -> RetrievalResult {
        let classification = crate::classifier::classify(input);
        let applies_context = build_applies_context(input, &classification);

        let (prompt_embedding, degraded) = match self.provider {
            Some(provider) => match provider.embed(&input.prompt_text, self.embedding_timeout) {
                Ok(v) => (v, false),
                Err(e) => {
                    warn!(error = %e, "embedding provider unavailable, degrading to keyword+applies ranking");
                    (Vec::new(), true)
                }
            },
            None => (Vec::new(), self.index.is_empty()),
        };

        let weights = if degraded || prompt_embedding.is_empty() {
            self.config.weights.without_semantic()
        } else {
            self.config.weights
        };

        // 1. Filter to active + trust >= community.
        let candidates: Vec<Pattern> = self
            .cache
            .active()
            .into_iter()
            .filter(|p| meets_minimum_trust(p.security.trust, self.security.trust_default))
            .collect();

        // 2. Score.
        let mut scored: Vec<ScoredPattern> = candidates
            .into_iter()
            .map(|pattern| {
                let score = scoring::score_pattern(
                    &pattern,
                    &classification.keywords,
                    &prompt_embedding,
                    self.index,
                    &applies_context,
                    &weights,
                );
                ScoredPattern { pattern, score }
            })
            .collect();

        // 3. Sort descending; tie-break by `updated` desc, then id asc.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.pattern.lifecycle.updated.cmp(&a.pattern.lifecycle.updated))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });

        // 4. Greedy-pack into budget; 5. cap at max_patterns.
        let mut selected = Vec::new();
        let mut used = 0usize;
        for candidate in scored {
            if selected.len() >= self.config.max_patterns {
                break;
            }
            let size = render::rendered_size(&candidate.pattern, self.config.per_pattern_cap_chars);
            if used + size > self.config.budget_chars {
                continue;
            }
            used += size;
            selected.push(candidate);
        }

        // 6. Record an injection event for each included pattern.
        for s in &selected {
            if let Err(e) = self.tracker.record_injection(s.pattern.id, session_id) {
                warn!(error = %e, pattern_id = %s.pattern.id, "failed to record injection");
            }
        }

        let patterns: Vec<Pattern> = selected.iter().map(|s| s.pattern.clone()).collect();
        let artifact = render::render_artifact(&patterns, self.config.per_pattern_cap_chars);

        debug!(selected = selected.len(), degraded, "retrieval complete");

        RetrievalResult {
            selected,
            artifact,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::pattern::PatternStore;
    use chrono::Utc;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PatternStore) {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        (dir, store)
    }

    /// Scenario S1: keyword + semantic fallback.
    #[test]
    fn s1_keyword_and_semantic_select_swift_pattern() {
        let (dir, store) = setup();
        let mut p1 = Pattern::new("swift-error-handling", "swift errors", "Handle Result<T,E> carefully in Swift", Utc::now()).unwrap();
        p1.applies.keywords = ["error", "result", "swift"].iter().map(|s| s.to_string()).collect();
        let mut p2 = Pattern::new("ios-layout", "ios layout", "Use autolayout constraints for ios views", Utc::now()).unwrap();
        p2.applies.keywords = ["layout", "autolayout"].iter().map(|s| s.to_string()).collect();
        store.create(p1).unwrap();
        store.create(p2).unwrap();

        let cache = PatternCache::new(&store);
        let index = EmbeddingIndex::new();
        let tracker = EffectivenessTracker::open(dir.path().join("tracking/usage.jsonl")).unwrap();
        let provider = MockEmbeddingProvider::new(64);

        // Pre-populate the embedding index so semantic ranking is active.
        for p in cache.active() {
            let v = provider.embed(&p.content, Duration::from_secs(1)).unwrap();
            index.upsert(p.id, v, p.security.hash.clone());
        }

        let retriever = Retriever::new(
            &cache,
            &index,
            &tracker,
            Some(&provider),
            RetrievalConfig::default(),
            SecurityConfig::default(),
        );

        let input = ClassifyInput::from_prompt("fix the error path in LoginViewModel.swift");
        let result = retriever.retrieve(&input, "s1");
        assert!(!result.selected.is_empty());
        assert_eq!(result.selected[0].pattern.name, "swift-error-handling");
    }

    /// Scenario S1 (degraded path): no embeddings available, keyword +
    /// applies still selects the right pattern.
    #[test]
    fn s1_keyword_only_without_embeddings() {
        let (dir, store) = setup();
        let mut p1 = Pattern::new("swift-error-handling", "d", "c", Utc::now()).unwrap();
        p1.applies.keywords = ["error", "result", "swift"].iter().map(|s| s.to_string()).collect();
        let mut p2 = Pattern::new("ios-layout", "d", "c", Utc::now()).unwrap();
        p2.applies.keywords = ["layout", "autolayout"].iter().map(|s| s.to_string()).collect();
        store.create(p1).unwrap();
        store.create(p2).unwrap();

        let cache = PatternCache::new(&store);
        let index = EmbeddingIndex::new();
        let tracker = EffectivenessTracker::open(dir.path().join("tracking/usage.jsonl")).unwrap();

        let retriever = Retriever::new(
            &cache,
            &index,
            &tracker,
            None,
            RetrievalConfig::default(),
            SecurityConfig::default(),
        );

        let input = ClassifyInput::from_prompt("fix the error path in LoginViewModel.swift");
        let result = retriever.retrieve(&input, "s1b");
        assert!(result.degraded);
        assert_eq!(result.selected[0].pattern.name, "swift-error-handling");
    }

    /// Scenario S5: budget respect.
    #[test]
    fn s5_budget_admits_only_higher_scoring_pattern() {
        let (dir, store) = setup();
        let mut p1 = Pattern::new("big-one", "d", "x".repeat(700), Utc::now()).unwrap();
        p1.learning.effectiveness = 0.9;
        let mut p2 = Pattern::new("small-one", "d", "y".repeat(600), Utc::now()).unwrap();
        p2.learning.effectiveness = 0.1;
        store.create(p1).unwrap();
        store.create(p2).unwrap();

        let cache = PatternCache::new(&store);
        let index = EmbeddingIndex::new();
        let tracker = EffectivenessTracker::open(dir.path().join("tracking/usage.jsonl")).unwrap();

        let config = RetrievalConfig { budget_chars: 1_000, per_pattern_cap_chars: 2_000, ..Default::default() };

        let retriever = Retriever::new(&cache, &index, &tracker, None, config, SecurityConfig::default());
        let input = ClassifyInput::from_prompt("anything");
        let result = retriever.retrieve(&input, "s5");
        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].pattern.name, "big-one");
    }

    #[test]
    fn untrusted_patterns_excluded() {
        let (dir, store) = setup();
        let mut p = Pattern::new("untrusted", "d", "content matches anything", Utc::now()).unwrap();
        p.security.trust = crate::config::TrustLevel::Untrusted;
        store.create(p).unwrap();

        let cache = PatternCache::new(&store);
        let index = EmbeddingIndex::new();
        let tracker = EffectivenessTracker::open(dir.path().join("tracking/usage.jsonl")).unwrap();
        let retriever = Retriever::new(
            &cache,
            &index,
            &tracker,
            None,
            RetrievalConfig::default(),
            SecurityConfig::default(),
        );
        let result = retriever.retrieve(&ClassifyInput::from_prompt("anything"), "s");
        assert!(result.selected.is_empty());
    }

    #[test]
    fn empty_store_returns_empty_artifact_not_error() {
        let (dir, store) = setup();
        let cache = PatternCache::new(&store);
        let index = EmbeddingIndex::new();
        let tracker = EffectivenessTracker::open(dir.path().join("tracking/usage.jsonl")).unwrap();
        let retriever = Retriever::new(
            &cache,
            &index,
            &tracker,
            None,
            RetrievalConfig::default(),
            SecurityConfig::default(),
        );
        let result = retriever.retrieve(&ClassifyInput::from_prompt("anything"), "s");
        assert!(result.selected.is_empty());
        assert!(result.artifact.starts_with("Selected patterns: 0"));
    }
}
