//! C1: Pattern Store — durable, content-addressed YAML files per pattern.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pattern::types::{LifecycleStatus, Pattern};

/// One line of the append-only tombstone log written by `delete()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TombstoneEntry {
    pub pattern_id: Uuid,
    pub name: String,
    pub deleted_at: DateTime<Utc>,
}

/// Predicate used by `list()` to filter the store.
pub type ListFilter<'a> = dyn Fn(&Pattern) -> bool + 'a;

/// Minimum normalised-Levenshtein similarity for `get()`'s fuzzy name
/// fallback to accept a candidate.
const FUZZY_NAME_THRESHOLD: f64 = 0.8;

/// Version counter the cache polls to know when to refresh. Bumped by
/// every store write.
#[derive(Debug, Default)]
pub struct StoreVersion(AtomicU64);

impl StoreVersion {
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// File-backed pattern store. One `<slug>.yaml` file per pattern under
/// `root`. Writes are serialized by a process-wide read-write lock; reads
/// run in parallel behind the same lock's read side. Crash safety is
/// provided by write-to-temp-then-rename.
pub struct PatternStore {
    root: PathBuf,
    // id -> (name, path) kept alongside the patterns for O(1) collision
    // checks without re-reading every file on each create().
    inner: RwLock<HashMap<Uuid, Pattern>>,
    version: Arc<StoreVersion>,
}

impl PatternStore {
    /// Open (creating if absent) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let store = Self {
            root,
            inner: RwLock::new(HashMap::new()),
            version: Arc::new(StoreVersion::default()),
        };
        store.acquire_root_lock()?;
        store.reload()?;
        Ok(store)
    }

    /// Write (or refresh) the advisory `<root>/.lock` sentinel that flags
    /// the root directory as owned by this process, per the cross-process
    /// shared-resource policy. Best-effort: a stale lock left behind by a
    /// crashed process is logged, not treated as fatal, since this engine
    /// makes no linearisability guarantee across processes.
    fn acquire_root_lock(&self) -> Result<()> {
        let lock_path = self.root.join(".lock");
        if let Ok(existing) = fs::read_to_string(&lock_path) {
            warn!(pid = %existing.trim(), path = %lock_path.display(), "found existing store lock file; proceeding (advisory only)");
        }
        fs::write(&lock_path, std::process::id().to_string())?;
        Ok(())
    }

    #[must_use]
    pub fn version(&self) -> Arc<StoreVersion> {
        Arc::clone(&self.version)
    }

    fn pattern_path(&self, pattern: &Pattern) -> PathBuf {
        self.root.join(format!("{}.yaml", pattern.slug()))
    }

    /// (Re)load every `*.yaml` file under `root` into memory. Malformed
    /// YAML is logged and skipped rather than treated as fatal; dangling
    /// relation ids are dropped rather than propagated.
    pub fn reload(&self) -> Result<()> {
        let mut loaded: HashMap<Uuid, Pattern> = HashMap::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_yaml = path.extension().and_then(|e| e.to_str()) == Some("yaml");
            if !is_yaml {
                continue;
            }
            match Self::load_file(&path) {
                Ok(pattern) => {
                    loaded.insert(pattern.id, pattern);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed pattern file");
                }
            }
        }

        let ids: std::collections::HashSet<Uuid> = loaded.keys().copied().collect();
        for pattern in loaded.values_mut() {
            pattern.relations.related.retain(|id| ids.contains(id));
            if let Some(s) = pattern.relations.supersedes {
                if !ids.contains(&s) {
                    pattern.relations.supersedes = None;
                }
            }
        }

        *self.inner.write() = loaded;
        self.version.bump();
        Ok(())
    }

    fn load_file(path: &Path) -> Result<Pattern> {
        let raw = fs::read_to_string(path)?;
        let pattern: Pattern = serde_yaml::from_str(&raw)?;
        Ok(pattern)
    }

    fn write_atomic(&self, pattern: &Pattern) -> Result<()> {
        let path = self.pattern_path(pattern);
        let tmp = path.with_extension("yaml.tmp");
        let yaml = serde_yaml::to_string(pattern)?;
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn name_collision(&self, name: &str, exclude: Option<Uuid>) -> bool {
        self.inner
            .read()
            .values()
            .any(|p| p.name == name && Some(p.id) != exclude)
    }

    /// Create a new pattern. Fails on id or name collision.
    pub fn create(&self, pattern: Pattern) -> Result<Pattern> {
        {
            let guard = self.inner.read();
            if guard.contains_key(&pattern.id) {
                return Err(Error::IdCollision(pattern.id));
            }
        }
        if self.name_collision(&pattern.name, None) {
            return Err(Error::NameCollision(pattern.name.clone()));
        }
        let mut pattern = pattern;
        pattern.rehash();
        self.write_atomic(&pattern)?;
        self.inner.write().insert(pattern.id, pattern.clone());
        self.version.bump();
        debug!(id = %pattern.id, name = %pattern.name, "pattern created");
        Ok(pattern)
    }

    /// Look up a pattern by id or by exact name. Falls back to the
    /// closest fuzzy name match (normalised Levenshtein similarity,
    /// [`FUZZY_NAME_THRESHOLD`]) when no exact match is found, tolerating
    /// a caller's typo in a pattern name.
    #[must_use]
    pub fn get(&self, id_or_name: &str) -> Option<Pattern> {
        let guard = self.inner.read();
        if let Ok(id) = Uuid::parse_str(id_or_name) {
            if let Some(p) = guard.get(&id) {
                return Some(p.clone());
            }
        }
        if let Some(p) = guard.values().find(|p| p.name == id_or_name) {
            return Some(p.clone());
        }

        let query = id_or_name.to_lowercase();
        guard
            .values()
            .filter_map(|p| {
                let score = strsim::normalized_levenshtein(&p.name.to_lowercase(), &query);
                (score >= FUZZY_NAME_THRESHOLD).then_some((score, p))
            })
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, p)| p.clone())
    }

    /// All pattern ids matching `filter`.
    #[must_use]
    pub fn list(&self, filter: &ListFilter<'_>) -> Vec<Uuid> {
        self.inner
            .read()
            .values()
            .filter(|p| filter(p))
            .map(|p| p.id)
            .collect()
    }

    /// All patterns, unfiltered (used by the cache refresh).
    #[must_use]
    pub fn all(&self) -> Vec<Pattern> {
        self.inner.read().values().cloned().collect()
    }

    /// Update an existing pattern in place. Bumps `updated`, rewrites
    /// atomically, and recomputes the content hash.
    pub fn update(&self, mut pattern: Pattern) -> Result<Pattern> {
        {
            let guard = self.inner.read();
            if !guard.contains_key(&pattern.id) {
                return Err(Error::NotFound(pattern.id.to_string()));
            }
        }
        if self.name_collision(&pattern.name, Some(pattern.id)) {
            return Err(Error::NameCollision(pattern.name.clone()));
        }
        pattern.lifecycle.updated = Utc::now();
        pattern.rehash();
        self.write_atomic(&pattern)?;
        self.inner.write().insert(pattern.id, pattern.clone());
        self.version.bump();
        Ok(pattern)
    }

    /// Transition `id` between lifecycle states. Fails with
    /// `InvalidTransition` if the move is not in the allowed state machine.
    pub fn transition(&self, id: Uuid, next: LifecycleStatus) -> Result<Pattern> {
        let mut pattern = {
            let guard = self.inner.read();
            guard
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))?
        };
        if !pattern.lifecycle.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: format!("{:?}", pattern.lifecycle.status),
                to: format!("{next:?}"),
            });
        }
        pattern.lifecycle.status = next;
        if next == LifecycleStatus::Active {
            pattern.lifecycle.deprecation_reason = None;
        }
        self.update(pattern)
    }

    /// Archive a pattern with a human-readable reason.
    pub fn archive(&self, id: Uuid, reason: impl Into<String>) -> Result<Pattern> {
        let mut pattern = self.transition(id, LifecycleStatus::Archived)?;
        pattern.lifecycle.deprecation_reason = Some(reason.into());
        self.update(pattern)
    }

    /// Reactivate an archived pattern, clearing its deprecation reason.
    pub fn reactivate(&self, id: Uuid) -> Result<Pattern> {
        self.transition(id, LifecycleStatus::Active)
    }

    /// Physically remove a pattern's file and in-memory entry, appending a
    /// tombstone line to `<root>/../tracking/tombstones.jsonl`.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let pattern = {
            let guard = self.inner.read();
            guard
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NotFound(id.to_string()))?
        };
        let path = self.pattern_path(&pattern);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        self.inner.write().remove(&id);
        self.version.bump();
        self.append_tombstone(&pattern)?;
        info!(id = %id, name = %pattern.name, "pattern deleted");
        Ok(())
    }

    /// Physically remove every pattern whose lifecycle status is `deleted`
    /// and whose `updated` timestamp is older than `retention_days`. This
    /// is the retention sweep referenced by spec: `delete()` performs the
    /// immediate physical removal the caller asked for; this sweep instead
    /// finds patterns soft-marked `deleted` via `transition()` and purges
    /// the ones that have aged past the grace window. Returns the purged
    /// ids; any individual removal failure is logged and does not abort
    /// the sweep.
    pub fn purge_expired_deletions(&self, retention_days: i64) -> Vec<Uuid> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let expired: Vec<Uuid> = self
            .inner
            .read()
            .values()
            .filter(|p| p.lifecycle.status == LifecycleStatus::Deleted && p.lifecycle.updated < cutoff)
            .map(|p| p.id)
            .collect();

        let mut purged = Vec::new();
        for id in expired {
            match self.delete(id) {
                Ok(()) => purged.push(id),
                Err(e) => warn!(id = %id, error = %e, "failed to purge expired deletion"),
            }
        }
        purged
    }

    /// Read every tombstone entry ever appended by `delete()`, oldest
    /// first. Tolerates a malformed trailing line left by a crashed write.
    pub fn list_lifecycle_tombstones(&self) -> Result<Vec<TombstoneEntry>> {
        let tracking_dir = self
            .root
            .parent()
            .map(|p| p.join("tracking"))
            .unwrap_or_else(|| PathBuf::from("tracking"));
        let path = tracking_dir.join("tombstones.jsonl");
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TombstoneEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "skipping malformed tombstone line"),
            }
        }
        Ok(entries)
    }

    fn append_tombstone(&self, pattern: &Pattern) -> Result<()> {
        use std::io::Write;
        let tracking_dir = self
            .root
            .parent()
            .map(|p| p.join("tracking"))
            .unwrap_or_else(|| PathBuf::from("tracking"));
        fs::create_dir_all(&tracking_dir)?;
        let entry = TombstoneEntry {
            pattern_id: pattern.id,
            name: pattern.name.clone(),
            deleted_at: Utc::now(),
        };
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(tracking_dir.join("tombstones.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pattern(name: &str) -> Pattern {
        Pattern::new(name, "desc", "content", Utc::now()).unwrap()
    }

    #[test]
    fn create_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let p = store.create(pattern("alpha")).unwrap();
        let fetched = store.get(&p.id.to_string()).unwrap();
        assert_eq!(fetched.name, "alpha");
        let by_name = store.get("alpha").unwrap();
        assert_eq!(by_name.id, p.id);
    }

    #[test]
    fn get_falls_back_to_fuzzy_name_match() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let p = store.create(pattern("rust-error-handling")).unwrap();

        let typo = store.get("rust-error-handlign").unwrap();
        assert_eq!(typo.id, p.id);

        assert!(store.get("completely-unrelated-name").is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        store.create(pattern("dup")).unwrap();
        let err = store.create(pattern("dup")).unwrap_err();
        assert!(matches!(err, Error::NameCollision(_)));
    }

    #[test]
    fn update_missing_fails() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let err = store.update(pattern("ghost")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn invalid_transition_rejected() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let p = store.create(pattern("p")).unwrap();
        let err = store.transition(p.id, LifecycleStatus::Deleted).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn reactivate_clears_deprecation_reason() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let p = store.create(pattern("p")).unwrap();
        store.archive(p.id, "stale").unwrap();
        let reactivated = store.reactivate(p.id).unwrap();
        assert_eq!(reactivated.lifecycle.status, LifecycleStatus::Active);
        assert!(reactivated.lifecycle.deprecation_reason.is_none());
    }

    #[test]
    fn delete_removes_file_and_writes_tombstone() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("patterns");
        let store = PatternStore::open(&root).unwrap();
        let p = store.create(pattern("gone")).unwrap();
        let path = root.join(format!("{}.yaml", p.slug()));
        assert!(path.exists());
        store.delete(p.id).unwrap();
        assert!(!path.exists());
        assert!(store.get(&p.id.to_string()).is_none());
        let tombstones = dir.path().join("tracking/tombstones.jsonl");
        assert!(tombstones.exists());
    }

    #[test]
    fn reload_skips_malformed_yaml() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("patterns");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("broken.yaml"), "not: [valid yaml structure for pattern").unwrap();
        let store = PatternStore::open(&root).unwrap();
        assert!(store.all().is_empty());
    }

    #[test]
    fn reload_drops_dangling_relations() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("patterns");
        let store = PatternStore::open(&root).unwrap();
        let mut p = store.create(pattern("has-dangling")).unwrap();
        p.relations.related.insert(Uuid::new_v4());
        store.update(p.clone()).unwrap();
        store.reload().unwrap();
        let reloaded = store.get(&p.id.to_string()).unwrap();
        assert!(reloaded.relations.related.is_empty());
    }

    #[test]
    fn update_rewrites_hash_on_content_change() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let mut p = store.create(pattern("mut")).unwrap();
        p.content = "new content".to_string();
        let updated = store.update(p).unwrap();
        assert!(updated.hash_matches());
    }

    #[test]
    fn list_lifecycle_tombstones_returns_every_delete() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("patterns")).unwrap();
        let a = store.create(pattern("a")).unwrap();
        let b = store.create(pattern("b")).unwrap();
        store.delete(a.id).unwrap();
        store.delete(b.id).unwrap();

        let tombstones = store.list_lifecycle_tombstones().unwrap();
        assert_eq!(tombstones.len(), 2);
        assert!(tombstones.iter().any(|t| t.pattern_id == a.id));
        assert!(tombstones.iter().any(|t| t.pattern_id == b.id));
    }

    #[test]
    fn purge_expired_deletions_removes_only_aged_soft_deletes() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("patterns");
        let store = PatternStore::open(&root).unwrap();
        let stale = store.create(pattern("stale")).unwrap();
        let fresh = store.create(pattern("fresh")).unwrap();

        store.archive(stale.id, "r").unwrap();
        let mut stale = store.transition(stale.id, LifecycleStatus::Deleted).unwrap();
        store.archive(fresh.id, "r").unwrap();
        store.transition(fresh.id, LifecycleStatus::Deleted).unwrap();

        // Backdate `stale`'s file directly: `update()` always stamps
        // `updated` to now, so the only way to simulate an aged soft
        // delete is to rewrite the file on disk and reload.
        stale.lifecycle.updated = Utc::now() - chrono::Duration::days(200);
        fs::write(root.join(format!("{}.yaml", stale.slug())), serde_yaml::to_string(&stale).unwrap()).unwrap();
        store.reload().unwrap();

        let purged = store.purge_expired_deletions(180);
        assert_eq!(purged, vec![stale.id]);
        assert!(store.get(&stale.id.to_string()).is_none());
        assert!(store.get(&fresh.id.to_string()).is_some());
    }

    #[test]
    fn open_logs_but_does_not_fail_on_existing_lock_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("patterns");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(".lock"), "999999").unwrap();
        let store = PatternStore::open(&root).unwrap();
        assert!(store.all().is_empty());
        assert!(root.join(".lock").exists());
    }
}
