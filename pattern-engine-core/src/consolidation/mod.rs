//! C7: Consolidator — periodic or on-demand health scoring, duplicate
//! clustering, conflict detection, and (in `auto` mode) safe-action
//! application over the active pattern set.

pub mod conflict;
pub mod duplicate;
pub mod health;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AutoMergeMode, ConsolidationConfig};
use crate::embeddings::EmbeddingIndex;
use crate::error::Result;
use crate::pattern::{Pattern, PatternCache, PatternStore};
use crate::tracker::EffectivenessTracker;

pub use conflict::{Conflict, ConflictKind};
pub use duplicate::MergeProposal;
pub use health::{HealthAction, HealthScore};

/// How a consolidation run is allowed to touch the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Compute and report only; the store is never mutated.
    DryRun,
    /// Apply archive and keep-best merge actions per `ConsolidationConfig`.
    Auto,
    /// Compute proposals but leave every action for the caller to apply
    /// individually via [`Consolidator::apply_merge`] /
    /// [`Consolidator::apply_archive`].
    Interactive,
}

/// Outcome of a single consolidation run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub total_patterns: usize,
    pub health_scores: HashMap<Uuid, HealthScore>,
    pub merge_proposals: Vec<MergeProposal>,
    pub conflicts: Vec<Conflict>,
    pub archived: Vec<Uuid>,
    pub merged: Vec<(Uuid, Uuid)>, // (keeper, removed)
    pub skipped_concurrent_modifications: Vec<Uuid>,
    pub below_threshold: bool,
    /// True if a `CancellationToken` stopped action application partway
    /// through; already-applied actions are not rolled back.
    pub cancelled: bool,
    /// Ids whose `learning.effectiveness` was recomputed from the tracker
    /// log and written back to the store this run. Empty in `DryRun`.
    pub effectiveness_refreshed: Vec<Uuid>,
}

/// A cooperative cancellation flag shared across clones, per the
/// concurrency model's "every long-running operation accepts a
/// cancellation token." Consolidation honours it between patterns during
/// action application, never mid-pattern update.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Computes health, clusters duplicates, detects conflicts, and (depending
/// on `RunMode`) applies the safe subset of actions.
pub struct Consolidator<'a> {
    store: &'a PatternStore,
    cache: &'a PatternCache<'a>,
    index: &'a EmbeddingIndex,
    tracker: &'a EffectivenessTracker,
    config: ConsolidationConfig,
}

impl<'a> Consolidator<'a> {
    #[must_use]
    pub fn new(
        store: &'a PatternStore,
        cache: &'a PatternCache<'a>,
        index: &'a EmbeddingIndex,
        tracker: &'a EffectivenessTracker,
        config: ConsolidationConfig,
    ) -> Self {
        Self {
            store,
            cache,
            index,
            tracker,
            config,
        }
    }

    /// Run the consolidation pipeline described in the module docs. `force`
    /// bypasses the `min_patterns_before_run` guard.
    pub fn run(&self, mode: RunMode, force: bool) -> Result<Report> {
        self.run_cancellable(mode, force, &CancellationToken::new())
    }

    /// Same as [`Consolidator::run`], but checks `token` between patterns
    /// while applying actions in `Auto` mode and stops (without rolling
    /// back already-applied actions) once it observes cancellation.
    pub fn run_cancellable(&self, mode: RunMode, force: bool, token: &CancellationToken) -> Result<Report> {
        let started = Instant::now();
        let active = self.cache.active();
        let total_patterns = active.len();

        if !force && active.len() < self.config.min_patterns_before_run {
            info!(count = active.len(), "below min_patterns_before_run, skipping run");
            return Ok(Report {
                total_patterns,
                below_threshold: true,
                ..Report::default()
            });
        }

        let stats = self.tracker.stats()?;
        let now = Utc::now();

        let health_scores: HashMap<Uuid, HealthScore> = active
            .iter()
            .map(|p| {
                let s = health::score_pattern(p, stats.get(&p.id), self.index, now, &self.config);
                (p.id, s)
            })
            .collect();

        let ids: Vec<Uuid> = active.iter().map(|p| p.id).collect();
        let clusters = duplicate::find_duplicate_clusters(&ids, self.index, self.config.merge_threshold);
        let merge_proposals: Vec<MergeProposal> = clusters
            .iter()
            .filter_map(|cluster| duplicate::keep_best_proposal(cluster, &health_scores, self.index))
            .collect();

        let conflicts = conflict::find_conflicts(&active);

        let mut report = Report {
            total_patterns,
            health_scores,
            merge_proposals,
            conflicts,
            ..Report::default()
        };

        if mode != RunMode::DryRun {
            report.effectiveness_refreshed = self.refresh_effectiveness()?;
        }

        if mode == RunMode::Auto {
            self.apply_all(&active, &mut report, token)?;
        }

        info!(
            mode = ?mode,
            total = total_patterns,
            merges = report.merge_proposals.len(),
            conflicts = report.conflicts.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "consolidation run complete"
        );
        Ok(report)
    }

    /// Recompute `learning.effectiveness` from the tracker log (per spec
    /// §4.6's weighted moving average) and write each changed value back
    /// to the store, closing the feedback → tracker → next-retrieval-cycle
    /// loop. A pattern id present in the log but no longer in the store
    /// (deleted) is skipped rather than treated as an error. Returns the
    /// ids actually rewritten.
    fn refresh_effectiveness(&self) -> Result<Vec<Uuid>> {
        let scores = self.tracker.refresh_effectiveness()?;
        let mut refreshed = Vec::new();
        for (id, effectiveness) in scores {
            let Some(mut pattern) = self.store.get(&id.to_string()) else {
                continue;
            };
            if (pattern.learning.effectiveness - effectiveness).abs() <= f32::EPSILON {
                continue;
            }
            pattern.learning.effectiveness = effectiveness;
            self.store.update(pattern)?;
            refreshed.push(id);
        }
        Ok(refreshed)
    }

    fn apply_all(&self, snapshot: &[Pattern], report: &mut Report, token: &CancellationToken) -> Result<()> {
        if self.config.auto_merge == AutoMergeMode::KeepBest {
            for proposal in report.merge_proposals.clone() {
                if token.is_cancelled() {
                    report.cancelled = true;
                    return Ok(());
                }
                match self.apply_merge(snapshot, &proposal) {
                    Ok(()) => report.merged.push((proposal.keeper, proposal.remove[0])),
                    Err(crate::error::Error::ConcurrentModification(id)) => {
                        warn!(id = %id, "skipping merge, stale snapshot");
                        report.skipped_concurrent_modifications.push(id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if self.config.auto_archive {
            let merged_away: std::collections::HashSet<Uuid> =
                report.merged.iter().map(|(_, removed)| *removed).collect();
            for (id, score) in report.health_scores.clone() {
                if score.action != HealthAction::Archive || merged_away.contains(&id) {
                    continue;
                }
                if token.is_cancelled() {
                    report.cancelled = true;
                    return Ok(());
                }
                match self.apply_archive(snapshot, id, &score.reason) {
                    Ok(()) => report.archived.push(id),
                    Err(crate::error::Error::ConcurrentModification(id)) => {
                        warn!(id = %id, "skipping archive, stale snapshot");
                        report.skipped_concurrent_modifications.push(id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Apply a single merge proposal: archive every `remove` member with a
    /// `"merged: duplicate of <keeper>"` reason, record it in the keeper's
    /// `relations`, and bump `health.last_consolidated` on both sides.
    /// Fails with `ConcurrentModification` if either pattern's `updated`
    /// timestamp has moved since `snapshot` was taken.
    pub fn apply_merge(&self, snapshot: &[Pattern], proposal: &MergeProposal) -> Result<()> {
        let mut keeper = self.fresh_or_conflict(snapshot, proposal.keeper)?;
        for removed_id in &proposal.remove {
            self.fresh_or_conflict(snapshot, *removed_id)?;
            let mut removed = self.store.archive(*removed_id, format!("merged: duplicate of {}", proposal.keeper))?;
            removed.health.last_consolidated = Some(Utc::now());
            self.store.update(removed)?;
            keeper.relations.related.insert(*removed_id);
            keeper.relations.supersedes = Some(*removed_id);
        }
        keeper.health.last_consolidated = Some(Utc::now());
        self.store.update(keeper)?;
        Ok(())
    }

    /// Archive a single pattern with `reason`, bumping `health.last_consolidated`.
    pub fn apply_archive(&self, snapshot: &[Pattern], id: Uuid, reason: &str) -> Result<()> {
        let _ = self.fresh_or_conflict(snapshot, id)?;
        let mut archived = self.store.archive(id, reason)?;
        archived.health.last_consolidated = Some(Utc::now());
        self.store.update(archived)?;
        Ok(())
    }

    /// Re-fetch `id` from the store and fail with `ConcurrentModification`
    /// if its `updated` timestamp has moved since `snapshot` was captured.
    fn fresh_or_conflict(&self, snapshot: &[Pattern], id: Uuid) -> Result<Pattern> {
        let snapshot_version = snapshot
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.lifecycle.updated);
        let current = self
            .store
            .get(&id.to_string())
            .ok_or(crate::error::Error::ConcurrentModification(id))?;
        if let Some(expected) = snapshot_version {
            if current.lifecycle.updated != expected {
                return Err(crate::error::Error::ConcurrentModification(id));
            }
        }
        Ok(current)
    }
}
