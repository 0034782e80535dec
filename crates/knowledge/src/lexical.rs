//! Lexical term matching.
//!
//! Deterministic bag-of-terms scoring used by the built-in backends to rank
//! passages and by the verifier to check that cited sentences overlap their
//! evidence.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could",
    "did", "do", "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into",
    "is", "it", "its", "me", "of", "on", "or", "she", "he", "so", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would", "you",
    "your",
];

/// Lowercased, stop-word-free, lightly stemmed terms of `text`.
pub fn content_terms(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .filter(|word| word.chars().count() > 1 || word.chars().all(|c| c.is_ascii_digit()))
        .map(|word| stem(&word))
        .collect()
}

/// Distinct content terms of `text`.
pub fn term_set(text: &str) -> HashSet<String> {
    content_terms(text).into_iter().collect()
}

/// Fraction of `needle`'s terms that also occur in `haystack`.
///
/// Returns 0 when `needle` has no content terms.
pub fn coverage(needle: &HashSet<String>, haystack: &HashSet<String>) -> f32 {
    if needle.is_empty() {
        return 0.0;
    }
    let found = needle.iter().filter(|term| haystack.contains(*term)).count();
    found as f32 / needle.len() as f32
}

/// Strip a plural "s" so "capitals" matches "capital".
fn stem(word: &str) -> String {
    if word.chars().count() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}
