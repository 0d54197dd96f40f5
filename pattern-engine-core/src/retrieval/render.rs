//! Rendering the selected patterns into a markdown injection artifact.

use crate::pattern::Pattern;

/// Per-pattern content cap before an explicit `(truncated)` marker is
/// appended.
const DEFAULT_PER_PATTERN_CAP: usize = 1_000;

/// Render a single pattern block: name, description, confirmed tags, then
/// content truncated to `cap` chars.
#[must_use]
pub fn render_pattern(pattern: &Pattern, cap: usize) -> String {
    let cap = if cap == 0 { DEFAULT_PER_PATTERN_CAP } else { cap };
    let tags: Vec<&str> = pattern.tags.confirmed.iter().map(String::as_str).collect();
    let mut content = pattern.content.clone();
    let truncated = content.chars().count() > cap;
    if truncated {
        content = content.chars().take(cap).collect();
    }

    let mut block = format!("## {}\n\n{}\n\n", pattern.name, pattern.description);
    if !tags.is_empty() {
        block.push_str(&format!("Tags: {}\n\n", tags.join(", ")));
    }
    block.push_str(&content);
    if truncated {
        block.push_str("\n(truncated)");
    }
    block
}

/// The full size a rendered pattern block would occupy, without actually
/// building the string — used by the greedy packer to decide admission.
#[must_use]
pub fn rendered_size(pattern: &Pattern, cap: usize) -> usize {
    render_pattern(pattern, cap).len()
}

/// Assemble the final markdown injection artifact from an ordered,
/// already-budget-packed list of patterns.
#[must_use]
pub fn render_artifact(patterns: &[Pattern], cap: usize) -> String {
    let mut out = format!("Selected patterns: {}\n\n", patterns.len());
    for pattern in patterns {
        out.push_str(&render_pattern(pattern, cap));
        out.push_str("\n\n---\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_selection_still_has_header() {
        let artifact = render_artifact(&[], 1000);
        assert!(artifact.starts_with("Selected patterns: 0"));
    }

    #[test]
    fn long_content_gets_truncated_marker() {
        let mut p = Pattern::new("p", "d", "x".repeat(2000), Utc::now()).unwrap();
        p.tags.confirmed.insert("rust".to_string());
        let block = render_pattern(&p, 100);
        assert!(block.contains("(truncated)"));
    }

    #[test]
    fn short_content_not_truncated() {
        let p = Pattern::new("p", "d", "short", Utc::now()).unwrap();
        let block = render_pattern(&p, 1000);
        assert!(!block.contains("(truncated)"));
    }
}
