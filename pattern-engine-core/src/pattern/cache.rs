//! C2: Pattern Cache — in-memory snapshot of active patterns for O(1)
//! listing. Lazily refreshed: every store write bumps a version counter;
//! the next `active()` call that observes a mismatch reloads from the
//! store.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::pattern::store::{PatternStore, StoreVersion};
use crate::pattern::types::Pattern;

struct Snapshot {
    version: u64,
    patterns: Vec<Pattern>,
}

/// Read-through cache in front of a `PatternStore`.
pub struct PatternCache<'s> {
    store: &'s PatternStore,
    store_version: Arc<StoreVersion>,
    snapshot: RwLock<Snapshot>,
}

impl<'s> PatternCache<'s> {
    #[must_use]
    pub fn new(store: &'s PatternStore) -> Self {
        let store_version = store.version();
        let patterns: Vec<Pattern> = store
            .all()
            .into_iter()
            .filter(Pattern::is_active)
            .collect();
        let snapshot = Snapshot {
            version: store_version.get(),
            patterns,
        };
        Self {
            store,
            store_version,
            snapshot: RwLock::new(snapshot),
        }
    }

    fn refresh_if_stale(&self) {
        let current = self.store_version.get();
        if self.snapshot.read().version == current {
            return;
        }
        let patterns: Vec<Pattern> = self
            .store
            .all()
            .into_iter()
            .filter(Pattern::is_active)
            .collect();
        debug!(count = patterns.len(), "pattern cache refreshed");
        let mut guard = self.snapshot.write();
        guard.version = current;
        guard.patterns = patterns;
    }

    /// Snapshot slice of all active patterns at refresh time.
    #[must_use]
    pub fn active(&self) -> Vec<Pattern> {
        self.refresh_if_stale();
        self.snapshot.read().patterns.clone()
    }

    /// Active patterns whose `applies.languages` or `applies.frameworks`
    /// contains `domain` (case-insensitive).
    #[must_use]
    pub fn by_domain(&self, domain: &str) -> Vec<Pattern> {
        let domain = domain.to_lowercase();
        self.active()
            .into_iter()
            .filter(|p| {
                p.applies.languages.iter().any(|l| l.to_lowercase() == domain)
                    || p.applies.frameworks.iter().any(|f| f.to_lowercase() == domain)
            })
            .collect()
    }

    /// Active patterns indexed by id, for O(1) relation resolution.
    #[must_use]
    pub fn active_by_id(&self) -> HashMap<uuid::Uuid, Pattern> {
        self.active().into_iter().map(|p| (p.id, p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn pattern(name: &str) -> Pattern {
        Pattern::new(name, "desc", "content", Utc::now()).unwrap()
    }

    #[test]
    fn active_excludes_non_active() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path()).unwrap();
        let p1 = store.create(pattern("a")).unwrap();
        let p2 = store.create(pattern("b")).unwrap();
        store.archive(p2.id, "stale").unwrap();

        let cache = PatternCache::new(&store);
        let active = cache.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, p1.id);
    }

    #[test]
    fn cache_refreshes_after_store_write() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path()).unwrap();
        let cache = PatternCache::new(&store);
        assert_eq!(cache.active().len(), 0);

        store.create(pattern("new")).unwrap();
        assert_eq!(cache.active().len(), 1);
    }

    #[test]
    fn by_domain_filters_on_language() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path()).unwrap();
        let mut p = pattern("swift-pattern");
        p.applies.languages.insert("swift".to_string());
        store.create(p).unwrap();
        store.create(pattern("other")).unwrap();

        let cache = PatternCache::new(&store);
        assert_eq!(cache.by_domain("swift").len(), 1);
        assert_eq!(cache.by_domain("rust").len(), 0);
    }
}
