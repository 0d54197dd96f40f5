//! C9: Sync Projection — pure rendering of the active pattern set into
//! tool-specific artifacts. Writing the result to an external CLI's
//! configuration directory is the caller's responsibility; this module
//! only produces bytes.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::pattern::Pattern;

/// Which renderer a sync target uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    /// A single small skill file per target directory: pattern count and
    /// trigger keywords only, never pattern bodies.
    LightweightIndex,
    /// One markdown file listing all patterns, each capped at 1 KB,
    /// ordered by effectiveness descending.
    SingleFileSnapshot,
    /// One subdirectory per pattern with a fixed skill manifest.
    PerPatternDirectory,
}

const SNAPSHOT_PER_PATTERN_CAP: usize = 1_024;

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

/// Render the lightweight index artifact: pattern count plus the union of
/// every active pattern's `applies.keywords`, sorted for determinism.
#[must_use]
pub fn render_lightweight_index(patterns: &[Pattern]) -> String {
    let mut keywords: BTreeSet<&str> = BTreeSet::new();
    for p in patterns {
        keywords.extend(p.applies.keywords.iter().map(String::as_str));
    }
    let keyword_list: Vec<&str> = keywords.into_iter().collect();
    format!(
        "# Pattern Index\n\n{} pattern(s) available. Call the pattern search operation when a \
         prompt touches any of: {}.\n",
        patterns.len(),
        keyword_list.join(", ")
    )
}

/// Render the single-file snapshot: markdown, patterns ordered by
/// `learning.effectiveness` descending (ties by id for determinism), each
/// capped at [`SNAPSHOT_PER_PATTERN_CAP`] chars.
#[must_use]
pub fn render_single_file_snapshot(patterns: &[Pattern]) -> String {
    let mut ordered: Vec<&Pattern> = patterns.iter().collect();
    ordered.sort_by(|a, b| {
        b.learning
            .effectiveness
            .partial_cmp(&a.learning.effectiveness)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut out = String::from("# Patterns\n\n");
    for p in ordered {
        out.push_str(&format!("## {}\n\n{}\n\n", p.name, p.description));
        out.push_str(&truncate_chars(&p.content, SNAPSHOT_PER_PATTERN_CAP));
        out.push_str("\n\n");
    }
    out
}

/// Render one skill-manifest file per pattern, keyed by slug, for targets
/// that require a per-pattern directory layout.
#[must_use]
pub fn render_per_pattern_manifests(patterns: &[Pattern]) -> Vec<(String, String)> {
    patterns
        .iter()
        .map(|p| {
            let manifest = format!(
                "name: {}\ndescription: {}\n---\n{}\n",
                p.name, p.description, p.content
            );
            (p.slug(), manifest)
        })
        .collect()
}

/// Write the projection for `target` into `dir`, which must already exist
/// and be writable by the caller. Idempotent: writing the same active set
/// twice produces byte-identical files (atomic temp-then-rename, same as
/// the store).
pub fn write_projection(target: SyncTarget, patterns: &[Pattern], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    match target {
        SyncTarget::LightweightIndex => {
            write_atomic(&dir.join("index.md"), &render_lightweight_index(patterns))?;
        }
        SyncTarget::SingleFileSnapshot => {
            write_atomic(&dir.join("patterns.md"), &render_single_file_snapshot(patterns))?;
        }
        SyncTarget::PerPatternDirectory => {
            for (slug, manifest) in render_per_pattern_manifests(patterns) {
                let pattern_dir = dir.join(&slug);
                fs::create_dir_all(&pattern_dir)?;
                write_atomic(&pattern_dir.join("SKILL.md"), &manifest)?;
            }
        }
    }
    Ok(())
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn pattern(name: &str, effectiveness: f32) -> Pattern {
        let mut p = Pattern::new(name, "desc", "content", Utc::now()).unwrap();
        p.learning.effectiveness = effectiveness;
        p
    }

    #[test]
    fn lightweight_index_excludes_content() {
        let mut p = pattern("p", 0.5);
        p.applies.keywords.insert("swift".to_string());
        p.content = "secret internal content".to_string();
        let rendered = render_lightweight_index(&[p]);
        assert!(rendered.contains("swift"));
        assert!(!rendered.contains("secret internal content"));
    }

    #[test]
    fn snapshot_orders_by_effectiveness_descending() {
        let low = pattern("low", 0.2);
        let high = pattern("high", 0.9);
        let rendered = render_single_file_snapshot(&[low, high]);
        assert!(rendered.find("## high").unwrap() < rendered.find("## low").unwrap());
    }

    #[test]
    fn snapshot_truncates_long_content() {
        let mut p = pattern("p", 0.5);
        p.content = "x".repeat(2_000);
        let rendered = render_single_file_snapshot(&[p]);
        assert!(rendered.len() < 2_000 + 200);
    }

    #[test]
    fn per_pattern_manifests_keyed_by_slug() {
        let p = pattern("My Pattern", 0.5);
        let manifests = render_per_pattern_manifests(std::slice::from_ref(&p));
        assert_eq!(manifests[0].0, p.slug());
        assert!(manifests[0].1.contains("My Pattern"));
    }

    #[test]
    fn projection_is_idempotent() {
        let dir = tempdir().unwrap();
        let patterns = vec![pattern("a", 0.5), pattern("b", 0.8)];
        write_projection(SyncTarget::SingleFileSnapshot, &patterns, dir.path()).unwrap();
        let first = fs::read_to_string(dir.path().join("patterns.md")).unwrap();
        write_projection(SyncTarget::SingleFileSnapshot, &patterns, dir.path()).unwrap();
        let second = fs::read_to_string(dir.path().join("patterns.md")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn lightweight_index_idempotent_write() {
        let dir = tempdir().unwrap();
        let patterns = vec![pattern("a", 0.5)];
        write_projection(SyncTarget::LightweightIndex, &patterns, dir.path()).unwrap();
        write_projection(SyncTarget::LightweightIndex, &patterns, dir.path()).unwrap();
        assert!(dir.path().join("index.md").exists());
    }
}
