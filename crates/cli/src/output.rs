//! Human-readable and JSON rendering of responses.

use ragent_agent::{AgentResponse, SafetyAssessment};
use ragent_core::{AppError, AppResult};
use serde::Serialize;

const RULE: &str = "--------------------------------------------------";

/// Render a response the way the interactive tool prints it.
pub fn format_response(response: &AgentResponse) -> String {
    let mut output = format!("\n{}\n", RULE);
    output.push_str(&format!("# Question: {}\n\n", response.question));

    if let Some(suggestion) = &response.suggestion {
        output.push_str(&format!("Did you mean: \"{}\"?\n\n", suggestion));
    }

    output.push_str(&format!("# Answer:\n{}\n\n", response.answer_text));

    if response.verdict.has_answer() && !response.citations.is_empty() {
        output.push_str("## Sources:\n");
        for citation in &response.citations {
            let label = match &citation.title {
                Some(title) => format!("{} ({})", title, citation.source_id),
                None => citation.source_id.clone(),
            };
            let note = if citation.cited { "" } else { " (not cited)" };
            output.push_str(&format!("  [{}] {}{}\n", citation.marker, label, note));
        }
        output.push('\n');
    }

    output.push_str(&format!("- Verdict: {}\n", response.verdict));
    if let Some(reason) = &response.reason {
        output.push_str(&format!("- Reason: {}\n", reason));
    }
    if let Some(safety) = &response.safety_reason {
        output.push_str(&format!("- Safety: {}\n", safety));
    }
    output.push_str(&format!(
        "- Processing time: {:.2} seconds\n",
        response.processing_time_ms as f64 / 1000.0
    ));
    output.push_str(RULE);
    output.push('\n');
    output
}

/// Render a safety classification.
pub fn format_assessment(question: &str, assessment: &SafetyAssessment) -> String {
    let mut output = format!(
        "{:?}  risk={:.2}  {}\n",
        assessment.verdict,
        assessment.risk_score,
        question.trim()
    );
    if let Some(reason) = &assessment.reason {
        output.push_str(&format!("  reason: {}\n", reason));
    }
    output
}

/// Pretty JSON for a single value.
pub fn to_json<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Serialization(e.to_string()))
}

/// Compact JSON, one value per line.
pub fn to_json_line<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|e| AppError::Serialization(e.to_string()))
}
