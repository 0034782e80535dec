//! Request and response types shared by the pipeline stages.

use crate::safety::{SafetyAssessment, SafetyVerdict};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reply for questions the Safety Gate blocks.
pub const UNSAFE_MESSAGE: &str =
    "I cannot provide an answer to this question as it appears to request harmful or inappropriate information.";

/// Reply when a stage fails; the specific reason travels separately.
pub const ERROR_MESSAGE: &str =
    "Sorry, I encountered an error while trying to answer your question.";

/// Reply when the evidence cannot support an answer. Also the exact phrase
/// the model is told to use when it has to refuse.
pub const INSUFFICIENT_EVIDENCE_MESSAGE: &str =
    "I don't have enough information in the available sources to answer this question.";

/// A classified question.
///
/// Created once per request by the orchestrator and never modified.
#[derive(Debug, Clone)]
pub struct Question {
    id: Uuid,
    text: String,
    safety: SafetyAssessment,
}

impl Question {
    pub fn new(id: Uuid, text: impl Into<String>, safety: SafetyAssessment) -> Self {
        Self {
            id,
            text: text.into(),
            safety,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn safety(&self) -> &SafetyAssessment {
        &self.safety
    }

    pub fn verdict(&self) -> SafetyVerdict {
        self.safety.verdict
    }

    /// Reason attached when the verdict is not CLEAR.
    pub fn safety_reason(&self) -> Option<&str> {
        self.safety.reason.as_deref()
    }
}

/// Final outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Answered,
    Partial,
    InsufficientEvidence,
    RefusedUnsafe,
    RefusedError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Answered => "ANSWERED",
            Verdict::Partial => "PARTIAL",
            Verdict::InsufficientEvidence => "INSUFFICIENT_EVIDENCE",
            Verdict::RefusedUnsafe => "REFUSED_UNSAFE",
            Verdict::RefusedError => "REFUSED_ERROR",
        }
    }

    /// Whether the response carries an answer derived from evidence.
    pub fn has_answer(&self) -> bool {
        matches!(self, Verdict::Answered | Verdict::Partial)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated text before verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,

    /// Model that produced the text; `None` when no completion was requested
    pub model: Option<String>,

    /// Completion calls made (0 for the no-evidence shortcut)
    pub attempts: u8,

    /// The provider stopped at the token cap
    pub truncated: bool,

    /// Leading evidence entries the prompt carried; markers beyond this were
    /// never shown to the model
    pub evidence_entries: usize,
}

impl Answer {
    /// An answer that did not involve the completion capability.
    pub fn canned(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            attempts: 0,
            truncated: false,
            evidence_entries: 0,
        }
    }
}

/// One evidence entry as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub marker: usize,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The answer text references this marker
    pub cited: bool,
}

/// The structured record returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub request_id: Uuid,
    pub question: String,
    pub verdict: Verdict,
    pub answer_text: String,
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_reason: Option<String>,
    /// Human-readable failure or downgrade reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Spelling suggestion the search backend used instead of the question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub processing_time_ms: u64,
}

impl AgentResponse {
    /// A response that has not reached a verdict yet.
    pub(crate) fn pending(request_id: Uuid, question: impl Into<String>) -> Self {
        Self {
            request_id,
            question: question.into(),
            verdict: Verdict::RefusedError,
            answer_text: ERROR_MESSAGE.to_string(),
            citations: Vec::new(),
            safety_reason: None,
            reason: None,
            suggestion: None,
            processing_time_ms: 0,
        }
    }

    /// Markers actually referenced by the answer text.
    pub fn cited_markers(&self) -> Vec<usize> {
        self.citations
            .iter()
            .filter(|c| c.cited)
            .map(|c| c.marker)
            .collect()
    }
}
