//! Retriever Adapter.
//!
//! Wraps a [`SearchBackend`] with a deadline, score normalisation,
//! deduplication by source identifier and a stable ranking.

use crate::backend::SearchBackend;
use crate::types::Passage;
use ragent_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default deadline for a single backend call.
pub const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(20);

/// Knobs applied on top of the backend.
#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    /// Deadline for one search call
    pub timeout: Duration,

    /// Passages scoring below this after normalisation are dropped
    pub min_score: f32,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RETRIEVAL_TIMEOUT,
            min_score: 0.0,
        }
    }
}

/// Outcome of one retrieval call.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Ranked passages, best first, unique by source id
    pub passages: Vec<Passage>,

    /// Spelling suggestion reported by the backend
    pub suggestion: Option<String>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Process-wide adapter around one search backend.
#[derive(Debug, Clone)]
pub struct RetrieverAdapter {
    backend: Arc<dyn SearchBackend>,
    options: RetrieverOptions,
}

impl RetrieverAdapter {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self::with_options(backend, RetrieverOptions::default())
    }

    pub fn with_options(backend: Arc<dyn SearchBackend>, options: RetrieverOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Retrieve up to `top_k` passages for `query`.
    ///
    /// # Errors
    /// `AppError::Retrieval` for `top_k == 0` or a failing backend,
    /// `AppError::Timeout` when the backend exceeds the deadline. An empty
    /// result is `Ok`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> AppResult<Retrieval> {
        if top_k == 0 {
            return Err(AppError::Retrieval("top_k must be at least 1".to_string()));
        }

        let start = Instant::now();
        let backend = self.backend.name().to_string();

        let results = tokio::time::timeout(self.options.timeout, self.backend.search(query, top_k))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "{} search exceeded {:.1}s",
                    backend,
                    self.options.timeout.as_secs_f64()
                ))
            })?
            .map_err(|e| match e {
                AppError::Timeout(msg) => AppError::Timeout(msg),
                AppError::Retrieval(msg) => AppError::Retrieval(msg),
                other => AppError::Retrieval(format!("{} search failed: {}", backend, other)),
            })?;

        let raw_count = results.hits.len();
        let scale = self.backend.score_scale();

        let mut best: HashMap<String, Passage> = HashMap::new();
        for (rank, hit) in results.hits.into_iter().enumerate() {
            if hit.text.trim().is_empty() {
                continue;
            }

            let score = scale.normalize(hit.score, rank);
            if score < self.options.min_score {
                continue;
            }

            let passage = Passage {
                source_id: hit.source_id,
                title: hit.title,
                text: hit.text,
                score,
                origin: backend.clone(),
                rank,
            };

            match best.get(&passage.source_id) {
                Some(existing) if existing.score >= passage.score => {}
                _ => {
                    best.insert(passage.source_id.clone(), passage);
                }
            }
        }

        let mut passages: Vec<Passage> = best.into_values().collect();
        rank_passages(&mut passages);
        passages.truncate(top_k);

        tracing::info!(
            "Retrieved {} passages from {} ({} raw hits) in {:.2}s",
            passages.len(),
            backend,
            raw_count,
            start.elapsed().as_secs_f64()
        );

        Ok(Retrieval {
            passages,
            suggestion: results.suggestion,
        })
    }
}

/// Sort by score descending, ties broken by backend rank.
pub fn rank_passages(passages: &mut [Passage]) {
    passages.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.rank.cmp(&b.rank))
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
}
