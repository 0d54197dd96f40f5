//! Shared test fixtures for `pattern-engine-core` and its integration
//! tests: temp store roots and pattern builders with sane defaults.

use chrono::Utc;
use pattern_engine_core::pattern::{Pattern, PatternStore};
use tempfile::TempDir;

/// A temp directory holding an open, empty `PatternStore`.
pub struct TestStore {
    pub dir: TempDir,
    pub store: PatternStore,
}

/// Open a fresh `PatternStore` rooted in a new temp directory.
pub fn test_store() -> TestStore {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = PatternStore::open(dir.path().join("patterns")).expect("open store");
    TestStore { dir, store }
}

/// Build a minimal active pattern with the given name, for tests that
/// don't care about description/content.
pub fn test_pattern(name: &str) -> Pattern {
    Pattern::new(name, "test pattern", "test content", Utc::now()).expect("valid pattern")
}

/// Build a pattern with explicit content, for tests asserting on scoring
/// or classification behavior.
pub fn test_pattern_with_content(name: &str, content: &str) -> Pattern {
    Pattern::new(name, "test pattern", content, Utc::now()).expect("valid pattern")
}
