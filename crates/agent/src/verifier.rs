//! Groundedness Verifier.
//!
//! Decides ANSWERED, PARTIAL or INSUFFICIENT_EVIDENCE for a generated answer
//! and removes citation markers that do not resolve to evidence.

use crate::citations::CitationSyntax;
use crate::evidence::EvidenceSet;
use crate::types::{Answer, Verdict, INSUFFICIENT_EVIDENCE_MESSAGE};
use ragent_core::config::{PartialPolicy, VerificationSettings};
use ragent_core::AppResult;
use ragent_knowledge::lexical::{coverage, term_set};
use std::collections::HashSet;

/// Openings of an uncited reply that count as a restated refusal.
const REFUSAL_PHRASES: &[&str] = &[
    "i don't have enough information",
    "i do not have enough information",
    "not enough information in the available sources",
    "the evidence does not answer",
    "the provided evidence does not",
];

/// Verifier output.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub verdict: Verdict,

    /// Answer with unknown markers removed
    pub answer_text: String,

    /// Markers that resolved, in order of first appearance
    pub cited_markers: Vec<usize>,

    /// Unknown marker numbers that were stripped
    pub stripped_markers: Vec<usize>,

    /// Why the verdict is not ANSWERED
    pub notes: Vec<String>,
}

impl Verification {
    fn new(verdict: Verdict, answer_text: impl Into<String>) -> Self {
        Self {
            verdict,
            answer_text: answer_text.into(),
            cited_markers: Vec::new(),
            stripped_markers: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Lower the verdict to at most `ceiling`, recording why.
    fn downgrade(&mut self, ceiling: Verdict, note: impl Into<String>) {
        if rank(ceiling) < rank(self.verdict) {
            self.verdict = ceiling;
        }
        self.notes.push(note.into());
    }
}

fn rank(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Answered => 2,
        Verdict::Partial => 1,
        _ => 0,
    }
}

/// Checks citations and substance of generated answers.
#[derive(Debug, Clone)]
pub struct GroundednessVerifier {
    settings: VerificationSettings,
    syntax: CitationSyntax,
}

impl GroundednessVerifier {
    pub fn new(settings: VerificationSettings) -> AppResult<Self> {
        Ok(Self {
            settings,
            syntax: CitationSyntax::new()?,
        })
    }

    pub fn with_defaults() -> AppResult<Self> {
        Self::new(VerificationSettings::default())
    }

    pub fn syntax(&self) -> &CitationSyntax {
        &self.syntax
    }

    /// Verify `answer` against the evidence it was generated from.
    pub fn verify(&self, answer: &Answer, evidence: &EvidenceSet) -> Verification {
        if evidence.is_empty() {
            let text = self.syntax.strip_all(&answer.text);
            let text = if text.is_empty() {
                INSUFFICIENT_EVIDENCE_MESSAGE.to_string()
            } else {
                text
            };
            let mut verification = Verification::new(Verdict::InsufficientEvidence, text);
            verification.notes.push("no evidence".to_string());
            return verification;
        }

        let stripped = self
            .syntax
            .strip_unknown(&answer.text, |marker| evidence.contains_marker(marker));

        let mut verification = Verification::new(Verdict::Answered, stripped.text.clone());
        verification.cited_markers = self.syntax.markers(&stripped.text);
        verification.stripped_markers = stripped.removed_markers.clone();

        let prose = self.syntax.strip_all(&stripped.text);
        if prose.is_empty() {
            verification.verdict = Verdict::InsufficientEvidence;
            verification.answer_text = INSUFFICIENT_EVIDENCE_MESSAGE.to_string();
            verification.notes.push("empty answer".to_string());
            return verification;
        }

        if stripped.removed > 0 {
            let note = format!(
                "removed {} unresolved citation(s): {:?}",
                stripped.removed, stripped.removed_markers
            );
            match self.settings.partial_policy {
                PartialPolicy::Conservative => verification.downgrade(Verdict::Partial, note),
                PartialPolicy::Coverage { min_valid_ratio } => {
                    let total = stripped.kept + stripped.removed;
                    let ratio = stripped.kept as f32 / total as f32;
                    if ratio >= min_valid_ratio {
                        verification.downgrade(Verdict::Partial, note);
                    } else {
                        verification.downgrade(Verdict::InsufficientEvidence, note);
                        verification.answer_text = INSUFFICIENT_EVIDENCE_MESSAGE.to_string();
                        verification.cited_markers.clear();
                        return verification;
                    }
                }
            }
        }

        if verification.cited_markers.is_empty() && is_refusal(&prose) {
            tracing::warn!(
                "Answer restates the refusal despite {} evidence entries (possible under-answering)",
                evidence.len()
            );
            verification.downgrade(Verdict::Partial, "refusal despite evidence");
            return verification;
        }

        if prose.chars().count() < self.settings.min_answer_chars {
            verification.downgrade(Verdict::Partial, "answer too short");
        }

        if verification.cited_markers.is_empty() {
            if self.settings.require_citations {
                verification.downgrade(Verdict::Partial, "no citations");
            }
        } else {
            self.check_claim_support(&stripped.text, evidence, &mut verification);
        }

        if answer.truncated {
            verification.downgrade(Verdict::Partial, "answer cut at the token cap");
        }

        verification
    }

    /// Every cited sentence must share enough terms with its passages.
    fn check_claim_support(
        &self,
        text: &str,
        evidence: &EvidenceSet,
        verification: &mut Verification,
    ) {
        for sentence in self.syntax.cited_sentences(text) {
            if sentence.markers.is_empty() {
                continue;
            }

            let claim = term_set(&sentence.text);
            if claim.is_empty() {
                continue;
            }

            let mut support: HashSet<String> = HashSet::new();
            for marker in &sentence.markers {
                if let Some(entry) = evidence.get(*marker) {
                    support.extend(term_set(&entry.passage.text));
                    if let Some(title) = &entry.passage.title {
                        support.extend(term_set(title));
                    }
                }
            }

            let overlap = coverage(&claim, &support);
            if overlap < self.settings.min_claim_support {
                verification.downgrade(
                    Verdict::Partial,
                    format!(
                        "weakly supported claim ({:.2}): {}",
                        overlap, sentence.text
                    ),
                );
            }
        }
    }
}

/// The whole reply is the refusal template, or opens with a refusal phrase.
///
/// A refusal phrase inside an otherwise substantive answer is a hedge, not a
/// refusal; callers only ask about uncited prose.
fn is_refusal(text: &str) -> bool {
    let reply = normalize_reply(text);
    reply == normalize_reply(INSUFFICIENT_EVIDENCE_MESSAGE)
        || REFUSAL_PHRASES.iter().any(|phrase| reply.starts_with(phrase))
}

/// Lowercased, whitespace collapsed, typographic apostrophes folded and
/// trailing punctuation removed.
fn normalize_reply(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace('\u{2019}', "'")
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}
