//! Relevance scoring: the five-channel blend described in the retriever
//! design, plus the maturity and penalty helper functions it is built on.

use std::collections::BTreeSet;
use uuid::Uuid;

use crate::config::RetrievalWeights;
use crate::embeddings::EmbeddingIndex;
use crate::pattern::Pattern;

/// Jaccard similarity between two keyword sets, plus a bonus per confirmed
/// tag that also appears in `extracted_keywords`.
#[must_use]
pub fn keyword_match(pattern: &Pattern, extracted_keywords: &BTreeSet<String>) -> f32 {
    let jaccard = jaccard_similarity(&pattern.applies.keywords, extracted_keywords);
    let confirmed_bonus = pattern
        .tags
        .confirmed
        .iter()
        .filter(|t| extracted_keywords.contains(t.as_str()))
        .count() as f32;
    (jaccard + 0.1 * confirmed_bonus).min(1.0)
}

fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Cosine similarity between the prompt embedding and the pattern's row in
/// the index. Zero if either is stale/absent (staleness policy).
#[must_use]
pub fn semantic_sim(pattern_id: Uuid, prompt_embedding: &[f32], index: &EmbeddingIndex) -> f32 {
    if prompt_embedding.is_empty() {
        return 0.0;
    }
    index.similarity_to_query(pattern_id, prompt_embedding)
}

/// Context used to evaluate `applies_match` and the negative-tag penalty.
#[derive(Debug, Clone, Default)]
pub struct AppliesContext {
    pub languages: BTreeSet<String>,
    pub frameworks: BTreeSet<String>,
    pub file_paths: Vec<String>,
    pub keywords: BTreeSet<String>,
}

/// 1.0 if any language/framework/file-pattern matches, else partial credit
/// for tag overlap, else 0.
#[must_use]
pub fn applies_match(pattern: &Pattern, context: &AppliesContext) -> f32 {
    let lang_hit = pattern.applies.languages.iter().any(|l| context.languages.contains(l));
    let fw_hit = pattern.applies.frameworks.iter().any(|f| context.frameworks.contains(f));
    let file_hit = pattern.applies.file_patterns.iter().any(|glob| {
        context
            .file_paths
            .iter()
            .any(|path| glob_matches(glob, path))
    });
    if lang_hit || fw_hit || file_hit {
        return 1.0;
    }
    jaccard_similarity(&pattern.tags.confirmed, &context.keywords)
}

/// Minimal glob matcher supporting a single trailing `*` (e.g. `*.swift`),
/// which covers the file-pattern shapes patterns are expected to declare.
fn glob_matches(glob: &str, path: &str) -> bool {
    if let Some(suffix) = glob.strip_prefix('*') {
        path.ends_with(suffix)
    } else if let Some(prefix) = glob.strip_suffix('*') {
        path.starts_with(prefix)
    } else {
        path == glob
    }
}

/// `log2(usage+1)/7` clamped to `[0,1]`, blended evenly with
/// `learning.effectiveness`.
#[must_use]
pub fn maturity_weight(pattern: &Pattern) -> f32 {
    let engagement = (((pattern.learning.usage_count + 1) as f32).log2() / 7.0).clamp(0.0, 1.0);
    0.5 * engagement + 0.5 * pattern.learning.effectiveness
}

/// `learning.effectiveness` directly.
#[must_use]
pub fn effectiveness(pattern: &Pattern) -> f32 {
    pattern.learning.effectiveness
}

/// 1.0 if any `tags.negative` entry matches the context's languages,
/// frameworks, or keywords, else 0.0.
#[must_use]
pub fn negative_tag_penalty(pattern: &Pattern, context: &AppliesContext) -> f32 {
    let hit = pattern.tags.negative.iter().any(|neg| {
        context.languages.contains(neg) || context.frameworks.contains(neg) || context.keywords.contains(neg)
    });
    if hit {
        1.0
    } else {
        0.0
    }
}

/// Full relevance score for `pattern` given the query context.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn score_pattern(
    pattern: &Pattern,
    extracted_keywords: &BTreeSet<String>,
    prompt_embedding: &[f32],
    index: &EmbeddingIndex,
    context: &AppliesContext,
    weights: &RetrievalWeights,
) -> f32 {
    let k = keyword_match(pattern, extracted_keywords);
    let s = semantic_sim(pattern.id, prompt_embedding, index);
    let a = applies_match(pattern, context);
    let m = maturity_weight(pattern);
    let e = effectiveness(pattern);
    let penalty = negative_tag_penalty(pattern, context);

    weights.keyword * k + weights.semantic * s + weights.applies * a + weights.maturity * m
        + weights.effectiveness * e
        - weights.negative_penalty * penalty
}
