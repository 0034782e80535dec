//! Built-in search backends and their factory.

pub mod local;
pub mod wikipedia;

pub use local::{CorpusDocument, LocalCorpus};
pub use wikipedia::WikipediaBackend;

use crate::backend::SearchBackend;
use ragent_core::config::RetrievalSettings;
use ragent_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create the backend named in `settings.backend`.
pub fn create_backend(settings: &RetrievalSettings) -> AppResult<Arc<dyn SearchBackend>> {
    match settings.backend.as_str() {
        "wikipedia" => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .unwrap_or(wikipedia::DEFAULT_WIKIPEDIA_API);
            let backend = WikipediaBackend::new(
                endpoint,
                settings.passage_chars,
                Duration::from_secs(settings.timeout_secs),
            )?;
            Ok(Arc::new(backend))
        }

        "local" => {
            let path = settings.corpus_path.as_ref().ok_or_else(|| {
                AppError::Config("The local backend requires retrieval.corpusPath".to_string())
            })?;
            let corpus = LocalCorpus::load(path, settings.passage_chars)?;
            Ok(Arc::new(corpus))
        }

        other => Err(AppError::Config(format!(
            "Unknown retrieval backend: '{}'. Supported backends: wikipedia, local",
            other
        ))),
    }
}
