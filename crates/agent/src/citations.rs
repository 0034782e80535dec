//! Inline citation markers: `[1]`, `[2][3]` and grouped `[1, 3]`.

use ragent_core::{AppError, AppResult};
use regex::{Captures, Regex};
use unicode_segmentation::UnicodeSegmentation;

const MARKER_PATTERN: &str = r"(\s*)\[(\d+(?:\s*,\s*\d+)*)\]";

/// Result of removing unknown markers from an answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrippedText {
    pub text: String,
    /// Occurrences of markers that resolved
    pub kept: usize,
    /// Occurrences of markers that were removed
    pub removed: usize,
    /// Numbers that were removed, in order of first appearance
    pub removed_markers: Vec<usize>,
}

/// A sentence of the answer and the markers attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CitedSentence {
    /// Sentence text with markers removed
    pub text: String,
    pub markers: Vec<usize>,
}

/// Compiled marker syntax.
#[derive(Debug, Clone)]
pub struct CitationSyntax {
    marker: Regex,
}

impl CitationSyntax {
    pub fn new() -> AppResult<Self> {
        let marker = Regex::new(MARKER_PATTERN)
            .map_err(|e| AppError::Config(format!("Invalid citation pattern: {}", e)))?;
        Ok(Self { marker })
    }

    /// Distinct marker numbers in order of first appearance.
    pub fn markers(&self, text: &str) -> Vec<usize> {
        let mut seen = Vec::new();
        for caps in self.marker.captures_iter(text) {
            for number in parse_group(&caps[2]).into_iter().flatten() {
                if !seen.contains(&number) {
                    seen.push(number);
                }
            }
        }
        seen
    }

    /// Remove every marker number for which `is_known` is false.
    ///
    /// Grouped markers keep their known members (`[1, 7]` becomes `[1]`); a
    /// marker with no known members disappears together with the whitespace
    /// before it.
    pub fn strip_unknown(&self, text: &str, is_known: impl Fn(usize) -> bool) -> StrippedText {
        let mut kept = 0;
        let mut removed = 0;
        let mut removed_markers = Vec::new();

        let rewritten = self.marker.replace_all(text, |caps: &Captures| {
            let mut valid = Vec::new();
            for number in parse_group(&caps[2]) {
                match number {
                    Some(n) if is_known(n) => {
                        kept += 1;
                        valid.push(n.to_string());
                    }
                    other => {
                        removed += 1;
                        if let Some(n) = other {
                            if !removed_markers.contains(&n) {
                                removed_markers.push(n);
                            }
                        }
                    }
                }
            }

            if valid.is_empty() {
                String::new()
            } else {
                format!("{}[{}]", &caps[1], valid.join(", "))
            }
        });

        StrippedText {
            text: rewritten.trim().to_string(),
            kept,
            removed,
            removed_markers,
        }
    }

    /// Remove all markers.
    pub fn strip_all(&self, text: &str) -> String {
        self.strip_unknown(text, |_| false).text
    }

    /// Split `text` into sentences, pairing each with its markers.
    ///
    /// A sentence consisting only of markers (as in `Paris is large. [1]`)
    /// attaches them to the preceding sentence.
    pub fn cited_sentences(&self, text: &str) -> Vec<CitedSentence> {
        let mut sentences: Vec<CitedSentence> = Vec::new();

        for raw in text.split_sentence_bounds() {
            let markers = self.markers(raw);
            let stripped = self.strip_all(raw);

            if stripped.chars().any(char::is_alphanumeric) {
                sentences.push(CitedSentence {
                    text: stripped,
                    markers,
                });
            } else if let Some(previous) = sentences.last_mut() {
                for marker in markers {
                    if !previous.markers.contains(&marker) {
                        previous.markers.push(marker);
                    }
                }
            }
        }

        sentences
    }
}

/// Marker numbers in a group; `None` for numbers too large to be a marker.
fn parse_group(group: &str) -> Vec<Option<usize>> {
    group
        .split(',')
        .map(|n| n.trim().parse::<usize>().ok())
        .collect()
}
