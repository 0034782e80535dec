//! Retrieval type definitions.

use serde::{Deserialize, Serialize};

/// One raw result from a search backend, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Stable identifier (document URI plus offset range)
    pub source_id: String,

    /// Human-readable document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Passage text
    pub text: String,

    /// Backend-native relevance score, interpreted through [`ScoreScale`]
    pub score: f32,
}

impl SearchHit {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            source_id: source_id.into(),
            title: None,
            text: text.into(),
            score,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Everything a backend returns for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Hits in backend rank order
    pub hits: Vec<SearchHit>,

    /// Spelling suggestion the backend searched with instead of the query
    pub suggestion: Option<String>,
}

impl SearchResults {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            suggestion: None,
        }
    }
}

/// How a backend's raw scores map onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreScale {
    /// Already in [0, 1]; values outside are clamped
    Unit,
    /// Unbounded similarity, squashed with the logistic function
    Logistic,
    /// L2 distance where `max` maps to 0 and 0 maps to 1
    Distance { max: f32 },
    /// Raw scores are ignored; 1 / (1 + rank)
    Rank,
}

impl ScoreScale {
    /// Normalise a raw score at backend rank `rank` (0-based).
    pub fn normalize(&self, raw: f32, rank: usize) -> f32 {
        let score = match *self {
            ScoreScale::Rank => 1.0 / (1.0 + rank as f32),
            _ if !raw.is_finite() => 0.0,
            ScoreScale::Unit => raw,
            ScoreScale::Logistic => 1.0 / (1.0 + (-raw).exp()),
            ScoreScale::Distance { max } if max > 0.0 => 1.0 - raw / max,
            ScoreScale::Distance { .. } => 0.0,
        };
        score.clamp(0.0, 1.0)
    }
}

/// A retrieved passage with a normalised score.
///
/// Passages are immutable once the Retriever Adapter creates them; the
/// Evidence Assembler takes ownership and derives truncated copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    /// Stable identifier, unique within one retrieval
    pub source_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub text: String,

    /// Relevance in [0, 1], higher is better
    pub score: f32,

    /// Backend that produced the passage
    pub origin: String,

    /// Position in the backend's result list (0-based)
    pub rank: usize,
}

impl Passage {
    /// Copy of this passage carrying shorter text.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }

    /// Length in characters, the unit of the evidence budget.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_scale_clamps() {
        assert_eq!(ScoreScale::Unit.normalize(1.7, 0), 1.0);
        assert_eq!(ScoreScale::Unit.normalize(-0.2, 0), 0.0);
        assert_eq!(ScoreScale::Unit.normalize(0.42, 3), 0.42);
    }

    #[test]
    fn test_non_finite_scores_are_zero() {
        assert_eq!(ScoreScale::Unit.normalize(f32::NAN, 0), 0.0);
        assert_eq!(ScoreScale::Logistic.normalize(f32::INFINITY, 0), 0.0);
    }

    #[test]
    fn test_logistic_scale() {
        assert!((ScoreScale::Logistic.normalize(0.0, 0) - 0.5).abs() < 1e-6);
        assert!(ScoreScale::Logistic.normalize(12.0, 0) > 0.99);
        assert!(ScoreScale::Logistic.normalize(-12.0, 0) < 0.01);
    }

    #[test]
    fn test_distance_scale() {
        let scale = ScoreScale::Distance { max: 100.0 };
        assert_eq!(scale.normalize(0.0, 0), 1.0);
        assert!((scale.normalize(25.0, 0) - 0.75).abs() < 1e-6);
        assert_eq!(scale.normalize(250.0, 0), 0.0);
        assert_eq!(ScoreScale::Distance { max: 0.0 }.normalize(1.0, 0), 0.0);
    }

    #[test]
    fn test_rank_scale_ignores_raw() {
        assert_eq!(ScoreScale::Rank.normalize(f32::NAN, 0), 1.0);
        assert_eq!(ScoreScale::Rank.normalize(99.0, 1), 0.5);
    }

    #[test]
    fn test_passage_with_text_keeps_identity() {
        let passage = Passage {
            source_id: "wiki:Paris".to_string(),
            title: Some("Paris".to_string()),
            text: "Paris is the capital of France. It is large.".to_string(),
            score: 0.9,
            origin: "local".to_string(),
            rank: 0,
        };

        let shorter = passage.with_text("Paris is the capital of France.");
        assert_eq!(shorter.source_id, passage.source_id);
        assert_eq!(shorter.char_len(), 31);
    }
}
