//! Orchestrator.
//!
//! Runs one request through the pipeline as an explicit state machine:
//!
//! ```text
//! START -> SAFETY_CHECKED -> RETRIEVED -> ASSEMBLED -> GENERATED -> VERIFIED -> DONE
//!   \            \                            \
//!    +------------+----------------------------+--> FAILED
//! ```
//!
//! Every transition goes through [`transition`] and is reported to the audit
//! sink. Every failure becomes a [`Verdict`] with a readable reason; raw
//! backend errors are only logged.

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::evidence::{assemble, EvidenceSet};
use crate::generator::{GeneratorOptions, GroundedGenerator};
use crate::safety::{SafetyAssessment, SafetyGate, SafetyVerdict};
use crate::types::{
    AgentResponse, Citation, Question, Verdict, ERROR_MESSAGE, UNSAFE_MESSAGE,
};
use crate::verifier::{GroundednessVerifier, Verification};
use ragent_core::{AppConfig, AppError, AppResult};
use ragent_knowledge::{create_backend, RetrieverAdapter, RetrieverOptions};
use ragent_llm::create_client;
use ragent_prompt::{load_prompt_or_builtin, GROUNDED_ANSWER_PROMPT, QUERY_REWRITE_PROMPT};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    SafetyChecked,
    Retrieved,
    Assembled,
    Generated,
    Verified,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Start => "START",
            PipelineState::SafetyChecked => "SAFETY_CHECKED",
            PipelineState::Retrieved => "RETRIEVED",
            PipelineState::Assembled => "ASSEMBLED",
            PipelineState::Generated => "GENERATED",
            PipelineState::Verified => "VERIFIED",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Stage outcomes that drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineEvent {
    /// Safety Gate returned CLEAR or SUSPICIOUS
    SafetyPassed,
    SafetyBlocked,
    RetrievalSucceeded,
    RetrievalFailed,
    /// Assembler returned, possibly with an empty set
    EvidenceAssembled,
    GenerationSucceeded,
    /// Generator failed on both attempts
    GenerationFailed,
    VerificationCompleted,
    Finalized,
    Cancelled,
}

/// The transition table.
///
/// # Errors
/// `AppError::Other` for any pair not in the table, including every event
/// from a terminal state.
pub fn transition(state: PipelineState, event: PipelineEvent) -> AppResult<PipelineState> {
    use PipelineEvent as E;
    use PipelineState as S;

    let next = match (state, event) {
        (S::Start, E::SafetyPassed) => S::SafetyChecked,
        (S::Start, E::SafetyBlocked) => S::Failed,
        (S::SafetyChecked, E::RetrievalSucceeded) => S::Retrieved,
        (S::SafetyChecked, E::RetrievalFailed) => S::Failed,
        (S::Retrieved, E::EvidenceAssembled) => S::Assembled,
        (S::Assembled, E::GenerationSucceeded) => S::Generated,
        (S::Assembled, E::GenerationFailed) => S::Failed,
        (S::Generated, E::VerificationCompleted) => S::Verified,
        (S::Verified, E::Finalized) => S::Done,
        (from, E::Cancelled) if !from.is_terminal() => S::Failed,
        (from, event) => {
            return Err(AppError::Other(format!(
                "illegal pipeline transition: {} on {:?}",
                from, event
            )))
        }
    };

    Ok(next)
}

/// Request-level settings.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub top_k: usize,
    pub evidence_budget_chars: usize,
    /// Ask the model for a search query before retrieving
    pub rewrite_query: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            evidence_budget_chars: 2048,
            rewrite_query: false,
        }
    }
}

/// Why a request ended without reaching verification.
#[derive(Debug)]
enum Stop {
    Unsafe(String),
    Error(String),
}

/// Per-request state machine bookkeeping.
struct Run<'a> {
    request_id: Uuid,
    state: PipelineState,
    sequence: u32,
    started: Instant,
    audit: &'a dyn AuditSink,
}

impl<'a> Run<'a> {
    fn new(request_id: Uuid, audit: &'a dyn AuditSink) -> Self {
        Self {
            request_id,
            state: PipelineState::Start,
            sequence: 0,
            started: Instant::now(),
            audit,
        }
    }

    fn advance(&mut self, event: PipelineEvent, detail: Option<String>) -> Result<(), Stop> {
        let to = transition(self.state, event).map_err(|e| {
            tracing::error!("{}", e);
            Stop::Error("internal pipeline error".to_string())
        })?;

        self.sequence += 1;
        self.audit.record(&AuditEvent {
            request_id: self.request_id,
            sequence: self.sequence,
            from: self.state,
            event,
            to,
            detail,
            elapsed_ms: self.elapsed_ms(),
        });
        self.state = to;
        Ok(())
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Stop at a stage boundary when the caller has gone away.
    fn checkpoint(&mut self, cancel: &CancellationToken) -> Result<(), Stop> {
        if cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&mut self) -> Stop {
        let detail = AppError::Cancelled(format!("caller went away in {}", self.state));
        if let Err(stop) = self.advance(PipelineEvent::Cancelled, Some(detail.to_string())) {
            return stop;
        }
        Stop::Error("request cancelled".to_string())
    }

    /// Race `future` against cancellation; the future is dropped on cancel.
    async fn race<T>(
        &mut self,
        cancel: &CancellationToken,
        future: impl Future<Output = T>,
    ) -> Result<T, Stop> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled()),
            output = future => Ok(output),
        }
    }
}

/// Sequences the pipeline stages for each request.
///
/// All components are read-only after construction, so one orchestrator can
/// serve concurrent requests.
pub struct Orchestrator {
    safety: Arc<SafetyGate>,
    retriever: RetrieverAdapter,
    generator: GroundedGenerator,
    verifier: GroundednessVerifier,
    audit: Arc<dyn AuditSink>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        safety: Arc<SafetyGate>,
        retriever: RetrieverAdapter,
        generator: GroundedGenerator,
        verifier: GroundednessVerifier,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            safety,
            retriever,
            generator,
            verifier,
            audit: Arc::new(TracingAuditSink),
            options,
        }
    }

    /// Replace the default tracing audit sink.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Build the full pipeline from configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let safety = Arc::new(SafetyGate::new(config.safety.clone())?);

        let mut retrieval = config.retrieval.clone();
        if let Some(path) = &retrieval.corpus_path {
            if path.is_relative() {
                retrieval.corpus_path = Some(config.workspace.join(path));
            }
        }
        let backend = create_backend(&retrieval)?;
        let retriever = RetrieverAdapter::with_options(
            backend,
            RetrieverOptions {
                timeout: Duration::from_secs(retrieval.timeout_secs),
                min_score: retrieval.min_score,
            },
        );

        let pipeline = &config.pipeline;
        let generation_timeout = Duration::from_secs(pipeline.generation_timeout_secs);
        let http_timeout = config
            .provider_timeout()
            .map(Duration::from_secs)
            .unwrap_or(generation_timeout);
        let api_key = config.resolve_api_key(&config.provider);
        let client = create_client(
            &config.provider,
            config.provider_endpoint(),
            api_key.as_deref(),
            Some(http_timeout),
        )?;

        let generator = GroundedGenerator::new(
            client,
            load_prompt_or_builtin(&config.workspace, GROUNDED_ANSWER_PROMPT)?,
            load_prompt_or_builtin(&config.workspace, QUERY_REWRITE_PROMPT)?,
            GeneratorOptions {
                model: config.model.clone(),
                temperature: pipeline.temperature,
                max_tokens: pipeline.max_response_tokens,
                timeout: generation_timeout,
            },
        );

        let verifier = GroundednessVerifier::new(config.verification.clone())?;

        tracing::info!(
            "Pipeline ready: provider={} model={} backend={}",
            config.provider,
            config.model,
            retrieval.backend
        );

        Ok(Self::new(
            safety,
            retriever,
            generator,
            verifier,
            OrchestratorOptions {
                top_k: retrieval.top_k,
                evidence_budget_chars: pipeline.evidence_budget_chars,
                rewrite_query: pipeline.rewrite_query,
            },
        ))
    }

    /// Run the Safety Gate only.
    pub fn classify(&self, question: &str) -> SafetyAssessment {
        self.safety.classify(question)
    }

    /// Answer a question. Always returns a complete response.
    pub async fn answer(&self, question: &str) -> AgentResponse {
        self.answer_with_cancel(question, &CancellationToken::new())
            .await
    }

    /// Answer a question, giving up at the next stage boundary (or during an
    /// external call) once `cancel` fires.
    pub async fn answer_with_cancel(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("request", id = %request_id);
        self.run(request_id, question, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request_id: Uuid,
        text: &str,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let mut run = Run::new(request_id, self.audit.as_ref());
        let mut response = AgentResponse::pending(request_id, text.trim());

        match self.execute(&mut run, text, cancel, &mut response).await {
            Ok(()) => {}
            Err(Stop::Unsafe(reason)) => {
                response.verdict = Verdict::RefusedUnsafe;
                response.answer_text = UNSAFE_MESSAGE.to_string();
                response.reason = Some(format!("blocked by safety gate: {}", reason));
                response.citations.clear();
            }
            Err(Stop::Error(reason)) => {
                response.verdict = Verdict::RefusedError;
                response.answer_text = ERROR_MESSAGE.to_string();
                response.reason = Some(reason);
                response.citations.clear();
            }
        }

        response.processing_time_ms = run.elapsed_ms();
        tracing::info!(
            "Request finished: {} in {}ms ({})",
            response.verdict,
            response.processing_time_ms,
            run.state
        );
        response
    }

    async fn execute(
        &self,
        run: &mut Run<'_>,
        text: &str,
        cancel: &CancellationToken,
        response: &mut AgentResponse,
    ) -> Result<(), Stop> {
        run.checkpoint(cancel)?;

        // Safety Gate
        let question = Question::new(run.request_id, text.trim(), self.safety.classify(text));
        response.safety_reason = question.safety_reason().map(str::to_string);
        match question.verdict() {
            SafetyVerdict::Blocked => {
                let reason = question
                    .safety_reason()
                    .unwrap_or("unsafe question")
                    .to_string();
                tracing::warn!("Question {} blocked: {}", question.id(), reason);
                run.advance(PipelineEvent::SafetyBlocked, Some(reason.clone()))?;
                return Err(Stop::Unsafe(reason));
            }
            SafetyVerdict::Suspicious => {
                tracing::warn!(
                    "Suspicious question (risk {:.2}): {}",
                    question.safety().risk_score,
                    question.safety_reason().unwrap_or("")
                );
                run.advance(
                    PipelineEvent::SafetyPassed,
                    Some(format!("suspicious: {}", question.safety_reason().unwrap_or(""))),
                )?;
            }
            SafetyVerdict::Clear => run.advance(PipelineEvent::SafetyPassed, None)?,
        }

        // Retriever Adapter
        run.checkpoint(cancel)?;
        let query = if self.options.rewrite_query {
            let backend = self.retriever.backend_name();
            run.race(cancel, self.generator.rewrite_query(question.text(), backend))
                .await?
        } else {
            question.text().to_string()
        };

        let retrieval = run
            .race(cancel, self.retriever.retrieve(&query, self.options.top_k))
            .await?;
        let retrieval = match retrieval {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::warn!("Retrieval failed: {}", e);
                let reason = match e {
                    AppError::Timeout(_) => "retrieval failed: the knowledge source timed out",
                    _ => "retrieval failed: the knowledge source is unavailable",
                };
                run.advance(PipelineEvent::RetrievalFailed, Some(e.to_string()))?;
                return Err(Stop::Error(reason.to_string()));
            }
        };
        response.suggestion = retrieval.suggestion.clone();
        run.advance(
            PipelineEvent::RetrievalSucceeded,
            Some(format!("{} passages", retrieval.passages.len())),
        )?;

        // Evidence Assembler
        run.checkpoint(cancel)?;
        let evidence = assemble(retrieval.passages, self.options.evidence_budget_chars);
        run.advance(
            PipelineEvent::EvidenceAssembled,
            Some(format!(
                "{} entries, {} chars",
                evidence.len(),
                evidence.total_chars()
            )),
        )?;

        // Grounded Generator
        run.checkpoint(cancel)?;
        let answer = match run
            .race(cancel, self.generator.generate(question.text(), &evidence))
            .await?
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                run.advance(PipelineEvent::GenerationFailed, Some(e.to_string()))?;
                return Err(Stop::Error(
                    "generation failed: the language model did not produce an answer".to_string(),
                ));
            }
        };
        run.advance(
            PipelineEvent::GenerationSucceeded,
            Some(format!("{} attempt(s)", answer.attempts)),
        )?;

        // Groundedness Verifier, against the evidence the answer was written from
        let evidence = evidence.prefix(answer.evidence_entries);
        let verification = self.verifier.verify(&answer, &evidence);
        run.advance(
            PipelineEvent::VerificationCompleted,
            Some(verification.verdict.to_string()),
        )?;

        self.fill_response(response, &verification, &evidence);
        run.advance(PipelineEvent::Finalized, None)?;
        Ok(())
    }

    fn fill_response(
        &self,
        response: &mut AgentResponse,
        verification: &Verification,
        evidence: &EvidenceSet,
    ) {
        response.verdict = verification.verdict;
        response.answer_text = verification.answer_text.clone();
        response.citations = evidence
            .entries()
            .iter()
            .map(|entry| Citation {
                marker: entry.marker,
                source_id: entry.passage.source_id.clone(),
                title: entry.passage.title.clone(),
                cited: verification.cited_markers.contains(&entry.marker),
            })
            .collect();
        response.reason = match verification.verdict {
            Verdict::Answered => None,
            _ => Some(verification.notes.join("; ")).filter(|r| !r.is_empty()),
        };
    }
}
