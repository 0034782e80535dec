//! Grounded Generator.
//!
//! Wraps the completion capability with a citation-constrained prompt. The
//! prompt is built by a pure function of (definition, question, evidence) so
//! it can be asserted on directly. A failed or timed-out completion is retried
//! once with a shortened prompt holding the first half of the evidence.

use crate::evidence::EvidenceSet;
use crate::types::{Answer, INSUFFICIENT_EVIDENCE_MESSAGE};
use ragent_core::{AppError, AppResult};
use ragent_llm::{LlmClient, LlmRequest};
use ragent_prompt::{build_prompt, BuiltPrompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Token cap for rewritten search queries.
const REWRITE_MAX_TOKENS: u32 = 64;

/// Decoding settings for grounded completions.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Deadline for one completion call
    pub timeout: Duration,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            model: "granite3.3:8b".to_string(),
            temperature: 0.1,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Render evidence as numbered entries, one paragraph each.
pub fn format_evidence(evidence: &EvidenceSet) -> String {
    evidence
        .entries()
        .iter()
        .map(|entry| {
            let text = entry.passage.text.trim();
            match &entry.passage.title {
                Some(title) => format!("[{}] {}: {}", entry.marker, title, text),
                None => format!("[{}] {}", entry.marker, text),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the grounded-answer prompt.
pub fn build_grounded_prompt(
    definition: &PromptDefinition,
    question: &str,
    evidence: &EvidenceSet,
) -> AppResult<BuiltPrompt> {
    let mut variables = HashMap::new();
    variables.insert("question".to_string(), question.trim().to_string());
    variables.insert("evidence".to_string(), format_evidence(evidence));
    variables.insert(
        "refusal".to_string(),
        INSUFFICIENT_EVIDENCE_MESSAGE.to_string(),
    );
    build_prompt(definition, variables)
}

/// Evidence kept by the retry prompt: the first half, rounded up.
pub fn shortened_evidence(evidence: &EvidenceSet) -> EvidenceSet {
    evidence.prefix(evidence.len().div_ceil(2))
}

/// Citation-constrained completion over an [`EvidenceSet`].
pub struct GroundedGenerator {
    client: Arc<dyn LlmClient>,
    answer_prompt: PromptDefinition,
    rewrite_prompt: PromptDefinition,
    options: GeneratorOptions,
}

impl GroundedGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        answer_prompt: PromptDefinition,
        rewrite_prompt: PromptDefinition,
        options: GeneratorOptions,
    ) -> Self {
        Self {
            client,
            answer_prompt,
            rewrite_prompt,
            options,
        }
    }

    /// Answer `question` from `evidence`.
    ///
    /// Empty evidence returns the insufficient-evidence reply without calling
    /// the model.
    ///
    /// # Errors
    /// `AppError::Generation` when both the full and the shortened prompt fail.
    pub async fn generate(&self, question: &str, evidence: &EvidenceSet) -> AppResult<Answer> {
        if evidence.is_empty() {
            tracing::debug!("No evidence; skipping completion");
            return Ok(Answer::canned(INSUFFICIENT_EVIDENCE_MESSAGE));
        }

        let prompt = build_grounded_prompt(&self.answer_prompt, question, evidence)?;
        let first_error = match self.complete(&prompt).await {
            Ok(mut answer) => {
                answer.attempts = 1;
                answer.evidence_entries = evidence.len();
                return Ok(answer);
            }
            Err(e) => e,
        };

        let shortened = shortened_evidence(evidence);
        tracing::warn!(
            "Generation failed ({}); retrying with {} of {} evidence entries",
            first_error,
            shortened.len(),
            evidence.len()
        );

        let prompt = build_grounded_prompt(&self.answer_prompt, question, &shortened)?;
        match self.complete(&prompt).await {
            Ok(mut answer) => {
                answer.attempts = 2;
                answer.evidence_entries = shortened.len();
                Ok(answer)
            }
            Err(second_error) => Err(AppError::Generation(format!(
                "completion failed twice: {}; {}",
                first_error, second_error
            ))),
        }
    }

    /// Ask the model for a concise search query.
    ///
    /// Any failure falls back to the question itself.
    pub async fn rewrite_query(&self, question: &str, backend: &str) -> String {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.trim().to_string());
        variables.insert("backend".to_string(), backend.to_string());

        let prompt = match build_prompt(&self.rewrite_prompt, variables) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("Query rewrite prompt failed: {}", e);
                return question.to_string();
            }
        };

        let mut request = LlmRequest::new(prompt.user, &self.options.model)
            .with_max_tokens(REWRITE_MAX_TOKENS)
            .with_temperature(0.0);
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        let result = tokio::time::timeout(self.options.timeout, self.client.complete(&request)).await;
        match result {
            Ok(Ok(response)) => match clean_query(&response.content) {
                Some(query) => {
                    tracing::info!("Rewrote query to \"{}\"", query);
                    query
                }
                None => question.to_string(),
            },
            Ok(Err(e)) => {
                tracing::warn!("Query rewrite failed: {}", e);
                question.to_string()
            }
            Err(_) => {
                tracing::warn!("Query rewrite timed out");
                question.to_string()
            }
        }
    }

    async fn complete(&self, prompt: &BuiltPrompt) -> AppResult<Answer> {
        let mut request = LlmRequest::new(prompt.user.clone(), &self.options.model)
            .with_max_tokens(self.options.max_tokens)
            .with_temperature(self.options.temperature);
        if let Some(system) = &prompt.system {
            request = request.with_system(system.clone());
        }

        tracing::debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.client.provider_name(),
            request.prompt_chars()
        );

        let response = tokio::time::timeout(self.options.timeout, self.client.complete(&request))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "completion exceeded {:.1}s",
                    self.options.timeout.as_secs_f64()
                ))
            })??;

        if !response.done {
            tracing::warn!("Completion stopped at the token cap");
        }

        Ok(Answer {
            text: response.content.trim().to_string(),
            model: Some(response.model),
            attempts: 1,
            truncated: !response.done,
            evidence_entries: 0,
        })
    }
}

/// First non-empty line of a model reply, without surrounding quotes.
fn clean_query(raw: &str) -> Option<String> {
    raw.lines()
        .map(|line| line.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::assemble;
    use ragent_knowledge::Passage;
    use ragent_prompt::{builtin_prompt, GROUNDED_ANSWER_PROMPT};

    fn evidence(texts: &[(&str, &str)]) -> EvidenceSet {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(rank, (id, text))| Passage {
                source_id: id.to_string(),
                title: None,
                text: text.to_string(),
                score: 1.0 - rank as f32 * 0.1,
                origin: "test".to_string(),
                rank,
            })
            .collect();
        assemble(passages, 10_000)
    }

    #[test]
    fn test_format_evidence() {
        let mut passages = vec![Passage {
            source_id: "wiki:Paris".to_string(),
            title: Some("Paris".to_string()),
            text: "Paris is the capital of France.".to_string(),
            score: 0.9,
            origin: "test".to_string(),
            rank: 0,
        }];
        passages.push(Passage {
            source_id: "doc:seine".to_string(),
            title: None,
            text: " The Seine flows through Paris. ".to_string(),
            score: 0.5,
            origin: "test".to_string(),
            rank: 1,
        });

        let formatted = format_evidence(&assemble(passages, 1000));
        assert_eq!(
            formatted,
            "[1] Paris: Paris is the capital of France.\n\n[2] The Seine flows through Paris."
        );
    }

    #[test]
    fn test_grounded_prompt_golden() {
        let definition = builtin_prompt(GROUNDED_ANSWER_PROMPT).unwrap();
        let set = evidence(&[("wiki:Paris", "Paris is the capital of France.")]);

        let prompt =
            build_grounded_prompt(&definition, "  What is the capital of France? ", &set).unwrap();

        assert_eq!(
            prompt.user,
            "Evidence:\n[1] Paris is the capital of France.\n\nQuestion: What is the capital of France?"
        );
        let system = prompt.system.unwrap();
        assert!(system.contains("ONLY the numbered evidence"));
        assert!(system.ends_with(INSUFFICIENT_EVIDENCE_MESSAGE));
    }

    #[test]
    fn test_grounded_prompt_is_pure() {
        let definition = builtin_prompt(GROUNDED_ANSWER_PROMPT).unwrap();
        let set = evidence(&[("a", "Alpha."), ("b", "Beta.")]);

        let first = build_grounded_prompt(&definition, "q", &set).unwrap();
        let second = build_grounded_prompt(&definition, "q", &set).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shortened_evidence_keeps_first_half() {
        let set = evidence(&[("a", "Alpha."), ("b", "Beta."), ("c", "Gamma.")]);
        let shortened = shortened_evidence(&set);
        assert_eq!(shortened.len(), 2);
        assert_eq!(shortened.get(1).unwrap().passage.source_id, "a");
        assert_eq!(shortened.get(2).unwrap().passage.source_id, "b");

        let single = evidence(&[("a", "Alpha.")]);
        assert_eq!(shortened_evidence(&single).len(), 1);
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(
            clean_query("\n  \"capital of France\"\nextra"),
            Some("capital of France".to_string())
        );
        assert_eq!(clean_query("  \n "), None);
    }
}
