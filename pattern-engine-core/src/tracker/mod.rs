//! C6: Effectiveness Tracker — append-only log of injections, feedback,
//! and outcomes, rolled up into per-pattern statistics.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Outcome of a session in which a pattern was injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failed,
    Skipped,
}

/// Explicit user rating of a pattern's usefulness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Helpful,
    Neutral,
    Unhelpful,
    None,
}

/// One line of the append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectivenessRecord {
    Injection {
        pattern_id: Uuid,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    Feedback {
        pattern_id: Uuid,
        session_id: String,
        timestamp: DateTime<Utc>,
        rating: Rating,
        comment: Option<String>,
    },
    OutcomeRecord {
        pattern_id: Uuid,
        session_id: String,
        timestamp: DateTime<Utc>,
        outcome: Outcome,
    },
}

impl EffectivenessRecord {
    #[must_use]
    pub fn pattern_id(&self) -> Uuid {
        match self {
            Self::Injection { pattern_id, .. }
            | Self::Feedback { pattern_id, .. }
            | Self::OutcomeRecord { pattern_id, .. } => *pattern_id,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Injection { timestamp, .. }
            | Self::Feedback { timestamp, .. }
            | Self::OutcomeRecord { timestamp, .. } => *timestamp,
        }
    }
}

/// Rolled-up per-pattern statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectivenessStats {
    pub helpful_count: u64,
    pub unhelpful_count: u64,
    pub applied_count: u64,
    pub success_rate: f32,
    pub last_feedback: Option<DateTime<Utc>>,
}

/// Rolling-average window used by `refresh_effectiveness`.
const EFFECTIVENESS_WINDOW: usize = 20;

/// Append-only effectiveness log, one JSON object per line. Appends are
/// lock-guarded; readers tolerate a partial last line (e.g. a crash
/// mid-write).
pub struct EffectivenessTracker {
    path: PathBuf,
    write_lock: Mutex<()>,
    /// Size above which the log is compacted into a summary and truncated.
    rotate_after_bytes: u64,
}

impl EffectivenessTracker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            rotate_after_bytes: 10 * 1024 * 1024,
        })
    }

    fn append(&self, record: &EffectivenessRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let line = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        self.rotate_if_needed(&file)?;
        Ok(())
    }

    fn rotate_if_needed(&self, file: &fs::File) -> Result<()> {
        let len = file.metadata()?.len();
        if len < self.rotate_after_bytes {
            return Ok(());
        }
        let stats = self.stats_unlocked()?;
        let summary_path = self.path.with_extension("summary.json");
        fs::write(&summary_path, serde_json::to_string_pretty(&stats_as_map(&stats))?)?;
        fs::write(&self.path, "")?;
        debug!(summary = %summary_path.display(), "effectiveness log rotated");
        Ok(())
    }

    pub fn record_injection(&self, pattern_id: Uuid, session_id: impl Into<String>) -> Result<()> {
        self.append(&EffectivenessRecord::Injection {
            pattern_id,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn record_feedback(
        &self,
        pattern_id: Uuid,
        session_id: impl Into<String>,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<()> {
        self.append(&EffectivenessRecord::Feedback {
            pattern_id,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            rating,
            comment,
        })
    }

    pub fn record_outcome(
        &self,
        pattern_id: Uuid,
        session_id: impl Into<String>,
        outcome: Outcome,
    ) -> Result<()> {
        self.append(&EffectivenessRecord::OutcomeRecord {
            pattern_id,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            outcome,
        })
    }

    /// Read every well-formed line of the log, tolerating a malformed or
    /// truncated trailing line.
    pub fn read_all(&self) -> Result<Vec<EffectivenessRecord>> {
        read_records(&self.path)
    }

    /// Rolled-up per-pattern stats over the whole log.
    pub fn stats(&self) -> Result<HashMap<Uuid, EffectivenessStats>> {
        self.stats_unlocked()
    }

    fn stats_unlocked(&self) -> Result<HashMap<Uuid, EffectivenessStats>> {
        let records = self.read_all()?;
        let mut by_pattern: HashMap<Uuid, Vec<EffectivenessRecord>> = HashMap::new();
        for r in records {
            by_pattern.entry(r.pattern_id()).or_default().push(r);
        }

        let mut out = HashMap::new();
        for (id, records) in by_pattern {
            out.insert(id, rollup(&records));
        }
        Ok(out)
    }

    /// Recompute `learning.effectiveness` per pattern as a weighted moving
    /// average over the most recent [`EFFECTIVENESS_WINDOW`] events,
    /// weights `[1.0, 0.9, 0.8, ...]` clamped at 0 for events beyond the
    /// window. Returns the new effectiveness score per pattern id; the
    /// caller (see [`crate::consolidation::Consolidator`]) is responsible
    /// for writing the result back to the store.
    pub fn refresh_effectiveness(&self) -> Result<HashMap<Uuid, f32>> {
        let records = self.read_all()?;
        let mut by_pattern: HashMap<Uuid, Vec<EffectivenessRecord>> = HashMap::new();
        for r in records {
            by_pattern.entry(r.pattern_id()).or_default().push(r);
        }

        let mut out = HashMap::new();
        for (id, mut records) in by_pattern {
            records.sort_by_key(EffectivenessRecord::timestamp);
            records.reverse(); // most recent first
            let score = weighted_effectiveness(&records);
            out.insert(id, score);
        }
        Ok(out)
    }
}

fn stats_as_map(stats: &HashMap<Uuid, EffectivenessStats>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = stats
        .iter()
        .map(|(id, s)| {
            (
                id.to_string(),
                serde_json::json!({
                    "helpful_count": s.helpful_count,
                    "unhelpful_count": s.unhelpful_count,
                    "applied_count": s.applied_count,
                    "success_rate": s.success_rate,
                }),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}

fn rollup(records: &[EffectivenessRecord]) -> EffectivenessStats {
    let mut stats = EffectivenessStats::default();
    let mut successes = 0u64;
    let mut applied = 0u64;
    for r in records {
        match r {
            EffectivenessRecord::Feedback {
                rating, timestamp, ..
            } => {
                match rating {
                    Rating::Helpful => stats.helpful_count += 1,
                    Rating::Unhelpful => stats.unhelpful_count += 1,
                    Rating::Neutral | Rating::None => {}
                }
                stats.last_feedback = Some(stats.last_feedback.map_or(*timestamp, |prev| prev.max(*timestamp)));
            }
            EffectivenessRecord::OutcomeRecord { outcome, .. } => {
                applied += 1;
                if matches!(outcome, Outcome::Success) {
                    successes += 1;
                }
            }
            EffectivenessRecord::Injection { .. } => {}
        }
    }
    stats.applied_count = applied;
    stats.success_rate = if applied == 0 {
        0.5
    } else {
        successes as f32 / applied as f32
    };
    stats
}

/// Weighted moving average over the most recent
/// [`EFFECTIVENESS_WINDOW`] events (already sorted most-recent-first),
/// mapping each record to a contribution in `[0,1]` and weighting by
/// recency with weights `1.0, 0.9, 0.8, ...` clamped at 0.
fn weighted_effectiveness(records_desc: &[EffectivenessRecord]) -> f32 {
    let mut weighted_sum = 0.0f32;
    let mut weight_total = 0.0f32;
    for (i, record) in records_desc.iter().take(EFFECTIVENESS_WINDOW).enumerate() {
        let weight = (1.0 - 0.1 * i as f32).max(0.0);
        if weight <= 0.0 {
            break;
        }
        let contribution = match record {
            EffectivenessRecord::Feedback { rating, .. } => match rating {
                Rating::Helpful => 1.0,
                Rating::Neutral => 0.5,
                Rating::Unhelpful => 0.0,
                Rating::None => continue,
            },
            EffectivenessRecord::OutcomeRecord { outcome, .. } => match outcome {
                Outcome::Success => 1.0,
                Outcome::Partial => 0.6,
                Outcome::Failed => 0.0,
                Outcome::Skipped => continue,
            },
            EffectivenessRecord::Injection { .. } => continue,
        };
        weighted_sum += contribution * weight;
        weight_total += weight;
    }

    if weight_total <= f32::EPSILON {
        0.5
    } else {
        (weighted_sum / weight_total).clamp(0.0, 1.0)
    }
}

fn read_records(path: &Path) -> Result<Vec<EffectivenessRecord>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => out.push(record),
            Err(e) => warn!(error = %e, "skipping malformed effectiveness log line"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_roundtrip() {
        let dir = tempdir().unwrap();
        let tracker = EffectivenessTracker::open(dir.path().join("usage.jsonl")).unwrap();
        let id = Uuid::new_v4();
        tracker.record_injection(id, "s1").unwrap();
        tracker.record_feedback(id, "s1", Rating::Helpful, None).unwrap();
        tracker.record_outcome(id, "s1", Outcome::Success).unwrap();

        let records = tracker.read_all().unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn stats_rollup_counts_helpful_and_unhelpful() {
        let dir = tempdir().unwrap();
        let tracker = EffectivenessTracker::open(dir.path().join("usage.jsonl")).unwrap();
        let id = Uuid::new_v4();
        for _ in 0..10 {
            tracker.record_feedback(id, "s", Rating::Helpful, None).unwrap();
        }
        tracker.record_feedback(id, "s", Rating::Unhelpful, None).unwrap();

        let stats = tracker.stats().unwrap();
        let s = &stats[&id];
        assert_eq!(s.helpful_count, 10);
        assert_eq!(s.unhelpful_count, 1);
    }

    #[test]
    fn refresh_effectiveness_moves_score_toward_one() {
        let dir = tempdir().unwrap();
        let tracker = EffectivenessTracker::open(dir.path().join("usage.jsonl")).unwrap();
        let id = Uuid::new_v4();
        // One stale unhelpful rating followed by a run of recent helpful
        // ones: recency weighting should dominate the rolling average.
        tracker.record_feedback(id, "s", Rating::Unhelpful, None).unwrap();
        for _ in 0..10 {
            tracker.record_feedback(id, "s", Rating::Helpful, None).unwrap();
        }

        let scores = tracker.refresh_effectiveness().unwrap();
        assert!(scores[&id] >= 0.85, "expected >= 0.85, got {}", scores[&id]);
    }

    #[test]
    fn malformed_trailing_line_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage.jsonl");
        let tracker = EffectivenessTracker::open(&path).unwrap();
        tracker.record_injection(Uuid::new_v4(), "s1").unwrap();
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "{{not valid json").unwrap();

        let records = tracker.read_all().unwrap();
        assert_eq!(records.len(), 1);
    }
}
