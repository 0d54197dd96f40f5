//! Per-pattern health scoring: freshness, engagement, quality, uniqueness.

use chrono::{DateTime, Utc};

use crate::config::ConsolidationConfig;
use crate::embeddings::EmbeddingIndex;
use crate::pattern::Pattern;
use crate::tracker::EffectivenessStats;

/// Action the health score recommends for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    Keep,
    Archive,
    Merge,
    Update,
    Delete,
}

/// Derived health score for a single pattern at consolidation time.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthScore {
    pub freshness: f32,
    pub engagement: f32,
    pub quality: f32,
    pub uniqueness: f32,
    pub overall: f32,
    pub action: HealthAction,
    pub reason: String,
}

/// `0.5^(time_since_last_activity / half_life)`, with a grace period for
/// newly created patterns that have zero usage (score = 1.0).
fn freshness(pattern: &Pattern, now: DateTime<Utc>, config: &ConsolidationConfig) -> f32 {
    let age_days = (now - pattern.lifecycle.created).num_seconds() as f64 / 86_400.0;
    if pattern.learning.usage_count == 0 && age_days <= config.grace_period_days {
        return 1.0;
    }
    let last_activity = pattern.learning.last_used.unwrap_or(pattern.lifecycle.created);
    let since_days = (now - last_activity).num_seconds().max(0) as f64 / 86_400.0;
    if config.decay_half_life_days <= 0.0 {
        return 0.0;
    }
    0.5f64.powf(since_days / config.decay_half_life_days) as f32
}

fn engagement(pattern: &Pattern) -> f32 {
    (((pattern.learning.usage_count + 1) as f32).log2() / 7.0).clamp(0.0, 1.0)
}

fn quality(stats: Option<&EffectivenessStats>) -> f32 {
    match stats {
        Some(s) if s.helpful_count + s.unhelpful_count > 0 => {
            s.helpful_count as f32 / (s.helpful_count + s.unhelpful_count) as f32
        }
        _ => 0.5,
    }
}

fn uniqueness(pattern: &Pattern, index: &EmbeddingIndex) -> f32 {
    if index.is_empty() {
        return 1.0;
    }
    match index.max_similarity(pattern.id) {
        Some(sim) => (1.0 - sim).clamp(0.0, 1.0),
        None => 1.0,
    }
}

/// Compute the health score for a single pattern.
#[must_use]
pub fn score_pattern(
    pattern: &Pattern,
    stats: Option<&EffectivenessStats>,
    index: &EmbeddingIndex,
    now: DateTime<Utc>,
    config: &ConsolidationConfig,
) -> HealthScore {
    let f = freshness(pattern, now, config);
    let e = engagement(pattern);
    let q = quality(stats);
    let u = uniqueness(pattern, index);
    let overall = 0.25 * f + 0.30 * e + 0.30 * q + 0.15 * u;

    let (action, reason) = decide_action(u, q, e, f, overall, config);

    HealthScore {
        freshness: f,
        engagement: e,
        quality: q,
        uniqueness: u,
        overall,
        action,
        reason,
    }
}

/// Priority-ordered action decision, per the consolidation pipeline.
fn decide_action(
    uniqueness: f32,
    quality: f32,
    engagement: f32,
    freshness: f32,
    overall: f32,
    config: &ConsolidationConfig,
) -> (HealthAction, String) {
    if uniqueness < 0.15 {
        return (HealthAction::Merge, "near-duplicate of another pattern".to_string());
    }
    if quality < 0.2 && engagement > 0.3 {
        return (
            HealthAction::Update,
            "frequently used but low quality feedback".to_string(),
        );
    }
    if freshness < 0.1 && engagement < 0.1 {
        return (HealthAction::Archive, "stale and unused".to_string());
    }
    if overall < 0.25 {
        return (HealthAction::Archive, "low overall health".to_string());
    }
    let _ = config;
    (HealthAction::Keep, "healthy".to_string())
}
