use pattern_engine_core::classifier::ClassifyInput;
use pattern_engine_core::config::{RetrievalConfig, SecurityConfig};
use pattern_engine_core::embeddings::{EmbeddingIndex, EmbeddingProvider, MockEmbeddingProvider};
use pattern_engine_core::pattern::PatternCache;
use pattern_engine_core::retrieval::Retriever;
use pattern_engine_core::sync::{write_projection, SyncTarget};
use pattern_engine_core::tracker::EffectivenessTracker;
use std::time::Duration;

/// Scenario S1: with embeddings available, the keyword+semantic match
/// wins and ranks first in the artifact.
#[test]
fn s1_artifact_contains_only_best_match() {
    let ts = test_utils::test_store();
    let mut p1 = test_utils::test_pattern_with_content(
        "swift-error-handling",
        "Handle Result<T,E> carefully in Swift error paths",
    );
    p1.applies.keywords = ["error", "result", "swift"].iter().map(|s| s.to_string()).collect();
    let mut p2 = test_utils::test_pattern_with_content("ios-layout", "Use autolayout constraints for ios views");
    p2.applies.keywords = ["layout", "autolayout"].iter().map(|s| s.to_string()).collect();
    ts.store.create(p1).unwrap();
    ts.store.create(p2).unwrap();

    let cache = PatternCache::new(&ts.store);
    let index = EmbeddingIndex::new();
    let tracker = EffectivenessTracker::open(ts.dir.path().join("tracking/usage.jsonl")).unwrap();
    let provider = MockEmbeddingProvider::new(64);
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

/// Scenario S6: the embedding provider is unavailable at query time; the
/// retriever degrades to keyword+applies ranking rather than failing.
#[test]
fn s6_embedding_outage_degrades_gracefully() {
    struct FailingProvider;
    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str, _timeout: Duration) -> pattern_engine_core::Result<Vec<f32>> {
            Err(pattern_engine_core::Error::ProviderUnavailable("simulated outage".into()))
        }
        fn model_name(&self) -> &str {
            "failing-provider"
        }
    }

    let ts = test_utils::test_store();
    let mut p = test_utils::test_pattern_with_content("retry-backoff", "Retry with exponential backoff on failure");
    p.applies.keywords = ["retry", "backoff"].iter().map(|s| s.to_string()).collect();
    ts.store.create(p).unwrap();

    let cache = PatternCache::new(&ts.store);
    let index = EmbeddingIndex::new();
    let tracker = EffectivenessTracker::open(ts.dir.path().join("tracking/usage.jsonl")).unwrap();
    let provider = FailingProvider;

    let retriever = Retriever::new(
        &cache,
        &index,
        &tracker,
        Some(&provider),
        RetrievalConfig::default(),
        SecurityConfig::default(),
    );
    let result = retriever.retrieve(&ClassifyInput::from_prompt("need a retry backoff strategy"), "s6");
    assert!(result.degraded);
    assert_eq!(result.selected.len(), 1);
}

/// Sync projection is idempotent for a fixed active set, end to end
/// through the public API.
#[test]
fn sync_projection_idempotent_for_fixed_set() {
    let ts = test_utils::test_store();
    ts.store.create(test_utils::test_pattern("a")).unwrap();
    ts.store.create(test_utils::test_pattern("b")).unwrap();

    let cache = PatternCache::new(&ts.store);
    let out_dir = ts.dir.path().join("sync-out");

    write_projection(SyncTarget::SingleFileSnapshot, &cache.active(), &out_dir).unwrap();
    let first = std::fs::read_to_string(out_dir.join("patterns.md")).unwrap();
    write_projection(SyncTarget::SingleFileSnapshot, &cache.active(), &out_dir).unwrap();
    let second = std::fs::read_to_string(out_dir.join("patterns.md")).unwrap();

    assert_eq!(first, second);
}

/// Store round-trip: create, reload from disk, and the pattern survives
/// with its content hash intact.
#[test]
fn store_survives_reload() {
    let ts = test_utils::test_store();
    let created = ts.store.create(test_utils::test_pattern_with_content("p", "durable content")).unwrap();

    ts.store.reload().unwrap();
    let reloaded = ts.store.get(&created.id.to_string()).unwrap();
    assert_eq!(reloaded.content, "durable content");
    assert!(reloaded.hash_matches());
}
