//! Conflict detection: find pattern pairs whose advice contradicts, or
//! whose relations/names mark one as superseded by the other.

use crate::classifier::extract_keywords;
use crate::pattern::Pattern;

/// Why two patterns were flagged as conflicting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// Opposing directive keywords (e.g. "always" vs "never") over
    /// overlapping subject matter.
    Contradiction,
    /// `a` supersedes `b`, or the two share a name but distinct ids.
    Outdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub a: uuid::Uuid,
    pub b: uuid::Uuid,
    pub kind: ConflictKind,
    pub reason: String,
}

/// Negation keyword pairs that signal directive contradiction when both
/// sides appear across a pair of patterns.
const OPPOSING_PAIRS: &[(&str, &str)] = &[
    ("always", "never"),
    ("prefer", "avoid"),
    ("must", "forbid"),
    ("allow", "forbid"),
    ("should", "shouldnt"),
];

/// Minimum number of shared content keywords (after stop-word removal)
/// required before a directive opposition counts as a real contradiction,
/// rather than two unrelated patterns that happen to use "always"/"never".
const MIN_SHARED_KEYWORDS: usize = 2;

fn detect_contradiction(a: &Pattern, b: &Pattern) -> Option<String> {
    let kw_a = extract_keywords(&a.content);
    let kw_b = extract_keywords(&b.content);
    let shared = kw_a.intersection(&kw_b).count();
    if shared < MIN_SHARED_KEYWORDS {
        return None;
    }

    for (word_a, word_b) in OPPOSING_PAIRS {
        let a_has_first = kw_a.contains(*word_a);
        let a_has_second = kw_a.contains(*word_b);
        let b_has_first = kw_b.contains(*word_a);
        let b_has_second = kw_b.contains(*word_b);
        if (a_has_first && b_has_second) || (a_has_second && b_has_first) {
            return Some(format!(
                "opposing directives \"{word_a}\"/\"{word_b}\" over {shared} shared keyword(s)"
            ));
        }
    }
    None
}

fn detect_outdated(a: &Pattern, b: &Pattern) -> Option<String> {
    if a.relations.supersedes == Some(b.id) {
        return Some(format!("{} supersedes {}", a.name, b.name));
    }
    if b.relations.supersedes == Some(a.id) {
        return Some(format!("{} supersedes {}", b.name, a.name));
    }
    if a.name == b.name && a.id != b.id {
        return Some("identical name, distinct id".to_string());
    }
    None
}

/// Scan every active pair in `patterns` for contradictions or
/// supersession/outdated relationships. O(n^2) over the active set, same
/// bound as duplicate clustering.
#[must_use]
pub fn find_conflicts(patterns: &[Pattern]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for i in 0..patterns.len() {
        for j in (i + 1)..patterns.len() {
            let a = &patterns[i];
            let b = &patterns[j];
            if let Some(reason) = detect_outdated(a, b) {
                conflicts.push(Conflict {
                    a: a.id,
                    b: b.id,
                    kind: ConflictKind::Outdated,
                    reason,
                });
                continue;
            }
            if let Some(reason) = detect_contradiction(a, b) {
                conflicts.push(Conflict {
                    a: a.id,
                    b: b.id,
                    kind: ConflictKind::Contradiction,
                    reason,
                });
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Scenario S3: contradictory advice over the same subject.
    #[test]
    fn s3_opposing_directives_flagged() {
        let a = Pattern::new(
            "commit-always-squash",
            "d",
            "Always squash commits before merging a feature branch",
            Utc::now(),
        )
        .unwrap();
        let b = Pattern::new(
            "commit-never-squash",
            "d",
            "Never squash commits, preserve full branch history",
            Utc::now(),
        )
        .unwrap();
        let conflicts = find_conflicts(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Contradiction);
    }

    #[test]
    fn unrelated_opposing_words_not_flagged() {
        let a = Pattern::new("p1", "d", "Always use tabs for indentation in Makefiles", Utc::now()).unwrap();
        let b = Pattern::new("p2", "d", "Never commit secrets to the repository", Utc::now()).unwrap();
        let conflicts = find_conflicts(&[a, b]);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn supersedes_relation_flagged_outdated() {
        let old = Pattern::new("old-style", "d", "content one", Utc::now()).unwrap();
        let mut new = Pattern::new("new-style", "d", "content two", Utc::now()).unwrap();
        new.relations.supersedes = Some(old.id);
        let conflicts = find_conflicts(&[old, new]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Outdated);
    }

    #[test]
    fn identical_name_distinct_id_flagged_outdated() {
        let a = Pattern::new("dup-name", "d", "content one", Utc::now()).unwrap();
        let b = Pattern::new("dup-name", "d", "content two", Utc::now()).unwrap();
        let conflicts = find_conflicts(&[a, b]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::Outdated);
    }
}
