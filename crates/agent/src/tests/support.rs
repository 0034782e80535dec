//! Fake retrieval and completion capabilities that count their calls.

use crate::audit::MemoryAuditSink;
use crate::generator::{GeneratorOptions, GroundedGenerator};
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::safety::SafetyGate;
use crate::verifier::GroundednessVerifier;
use ragent_core::config::VerificationSettings;
use ragent_core::{AppError, AppResult};
use ragent_knowledge::{
    RetrieverAdapter, RetrieverOptions, ScoreScale, SearchBackend, SearchHit, SearchResults,
};
use ragent_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use ragent_prompt::{builtin_prompt, GROUNDED_ANSWER_PROMPT, QUERY_REWRITE_PROMPT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type SearchHandler = Box<dyn Fn(&str, usize) -> AppResult<SearchResults> + Send + Sync>;
type CompletionHandler = Box<dyn Fn(usize, &LlmRequest) -> AppResult<String> + Send + Sync>;

pub struct FakeSearch {
    handler: SearchHandler,
    delay: Duration,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl std::fmt::Debug for FakeSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSearch")
            .field("calls", &self.calls())
            .finish()
    }
}

impl FakeSearch {
    pub fn new(
        handler: impl Fn(&str, usize) -> AppResult<SearchResults> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `hits`.
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self::new(move |_, _| Ok(SearchResults::new(hits.clone())))
    }

    /// Always fails like an unreachable server.
    pub fn unreachable() -> Self {
        Self::new(|_, _| Err(AppError::Retrieval("connection refused (os error 111)".to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SearchBackend for FakeSearch {
    fn name(&self) -> &str {
        "fake"
    }

    fn score_scale(&self) -> ScoreScale {
        ScoreScale::Unit
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<SearchResults> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(query, limit)
    }
}

pub struct FakeLlm {
    handler: CompletionHandler,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl FakeLlm {
    /// `handler` receives the 0-based call index and the request.
    pub fn new(
        handler: impl Fn(usize, &LlmRequest) -> AppResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Always answers with `text`.
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmClient for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = (self.handler)(call, request)?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 10),
            done: true,
        })
    }
}

pub fn hit(source_id: &str, text: &str, score: f32) -> SearchHit {
    SearchHit::new(source_id, text, score)
}

pub fn paris_hits() -> Vec<SearchHit> {
    vec![
        hit("wiki:Paris", "Paris is the capital of France.", 0.9),
        hit("wiki:Seine", "The Seine flows through Paris.", 0.7),
        hit("wiki:Louvre", "The Louvre is a museum in Paris.", 0.5),
    ]
}

/// Knobs for building a test pipeline.
pub struct Harness {
    pub search: Arc<FakeSearch>,
    pub llm: Arc<FakeLlm>,
    pub audit: Arc<MemoryAuditSink>,
    pub options: OrchestratorOptions,
    pub verification: VerificationSettings,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
}

impl Harness {
    pub fn new(search: FakeSearch, llm: FakeLlm) -> Self {
        Self {
            search: Arc::new(search),
            llm: Arc::new(llm),
            audit: Arc::new(MemoryAuditSink::new()),
            options: OrchestratorOptions::default(),
            verification: VerificationSettings::default(),
            retrieval_timeout: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(5),
        }
    }

    pub fn build(&self) -> Orchestrator {
        let safety = Arc::new(SafetyGate::with_defaults().unwrap());
        let retriever = RetrieverAdapter::with_options(
            self.search.clone(),
            RetrieverOptions {
                timeout: self.retrieval_timeout,
                min_score: 0.0,
            },
        );
        let generator = GroundedGenerator::new(
            self.llm.clone(),
            builtin_prompt(GROUNDED_ANSWER_PROMPT).unwrap(),
            builtin_prompt(QUERY_REWRITE_PROMPT).unwrap(),
            GeneratorOptions {
                model: "fake-model".to_string(),
                timeout: self.generation_timeout,
                ..Default::default()
            },
        );
        let verifier = GroundednessVerifier::new(self.verification.clone()).unwrap();

        Orchestrator::new(safety, retriever, generator, verifier, self.options.clone())
            .with_audit_sink(self.audit.clone())
    }
}
