//! Evidence Assembler.
//!
//! Turns ranked passages into a bounded, numbered [`EvidenceSet`].

use ragent_knowledge::{rank_passages, Passage};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// A passage bound to its citation marker.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceEntry {
    pub marker: usize,
    pub passage: Passage,
    /// Text was cut at a sentence boundary to fit the budget
    pub truncated: bool,
}

/// Ordered evidence for one request.
///
/// Invariants, upheld by [`assemble`]: total text length is within the
/// budget, source ids are unique and markers run 1..=len in order.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceSet {
    entries: Vec<EvidenceEntry>,
    budget: usize,
}

impl EvidenceSet {
    pub fn empty(budget: usize) -> Self {
        Self {
            entries: Vec::new(),
            budget,
        }
    }

    pub fn entries(&self) -> &[EvidenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Combined passage length in characters.
    pub fn total_chars(&self) -> usize {
        self.entries.iter().map(|e| e.passage.char_len()).sum()
    }

    pub fn get(&self, marker: usize) -> Option<&EvidenceEntry> {
        marker
            .checked_sub(1)
            .and_then(|idx| self.entries.get(idx))
    }

    pub fn contains_marker(&self, marker: usize) -> bool {
        marker >= 1 && marker <= self.entries.len()
    }

    /// The first `count` entries; markers are unchanged.
    pub fn prefix(&self, count: usize) -> Self {
        Self {
            entries: self.entries.iter().take(count).cloned().collect(),
            budget: self.budget,
        }
    }
}

/// Select, truncate and number passages within `budget` characters.
///
/// Passages are ranked by score (ties by retrieval rank) and admitted
/// greedily. The first passage that does not fit is cut at the last sentence
/// boundary inside the remaining budget and assembly stops; when no boundary
/// fits, the passage is dropped and the next one is tried. Blank passages and
/// repeated source ids are skipped.
pub fn assemble(mut passages: Vec<Passage>, budget: usize) -> EvidenceSet {
    rank_passages(&mut passages);

    let mut entries: Vec<EvidenceEntry> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut remaining = budget;

    for passage in passages {
        if remaining == 0 {
            break;
        }
        if passage.text.trim().is_empty() || seen.contains(&passage.source_id) {
            continue;
        }

        let length = passage.char_len();
        if length <= remaining {
            remaining -= length;
            seen.insert(passage.source_id.clone());
            entries.push(EvidenceEntry {
                marker: entries.len() + 1,
                passage,
                truncated: false,
            });
            continue;
        }

        match truncate_at_sentence(&passage.text, remaining) {
            Some(text) => {
                tracing::debug!(
                    "Truncated {} from {} to {} chars",
                    passage.source_id,
                    length,
                    text.chars().count()
                );
                entries.push(EvidenceEntry {
                    marker: entries.len() + 1,
                    passage: passage.with_text(text),
                    truncated: true,
                });
                break;
            }
            None => {
                tracing::debug!(
                    "Dropped {} ({} chars, no sentence fits in {})",
                    passage.source_id,
                    length,
                    remaining
                );
            }
        }
    }

    let set = EvidenceSet { entries, budget };
    tracing::debug!(
        "Assembled {} evidence entries ({} of {} chars)",
        set.len(),
        set.total_chars(),
        budget
    );
    set
}

/// Longest run of whole sentences from the start of `text` within `max_chars`.
fn truncate_at_sentence(text: &str, max_chars: usize) -> Option<String> {
    let mut end = 0;
    let mut used = 0;

    for sentence in text.split_sentence_bounds() {
        let chars = sentence.chars().count();
        if used + chars > max_chars {
            // Trailing whitespace of the sentence may be what overflows
            if used + sentence.trim_end().chars().count() <= max_chars {
                end += sentence.trim_end().len();
            }
            break;
        }
        used += chars;
        end += sentence.len();
    }

    let truncated = text[..end].trim_end();
    if truncated.trim().is_empty() {
        None
    } else {
        Some(truncated.to_string())
    }
}
