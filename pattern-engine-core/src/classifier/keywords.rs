//! Keyword extraction: lowercase, dedupe, strip stop-words.

use std::collections::BTreeSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "to", "of", "in", "on",
    "for", "with", "and", "or", "but", "this", "that", "it", "at", "by", "from", "as", "i", "me",
    "my", "we", "our", "you", "your", "please", "can", "could", "should", "would", "do", "does",
    "did", "will", "just", "so", "if", "then", "than",
];

/// Extract lowercase, deduplicated, stop-word-stripped keywords from free
/// text. Punctuation is treated as a separator.
#[must_use]
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}
