//! Local corpus backend.
//!
//! Loads a YAML or JSON file of documents once, splits them into passages and
//! answers searches with lexical overlap scores.

use crate::backend::SearchBackend;
use crate::chunker::split_into_passages;
use crate::lexical::{coverage, term_set};
use crate::types::{ScoreScale, SearchHit, SearchResults};
use ragent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One document in a corpus file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    /// Document URI (e.g., "wiki:Paris", "file:notes/rust.md")
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    pub text: String,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    documents: Vec<CorpusDocument>,
}

#[derive(Debug)]
struct IndexedPassage {
    source_id: String,
    title: Option<String>,
    text: String,
    terms: HashSet<String>,
}

/// In-memory corpus, read-only after loading.
#[derive(Debug)]
pub struct LocalCorpus {
    passages: Vec<IndexedPassage>,
}

impl LocalCorpus {
    /// Load a corpus file. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: &Path, passage_chars: usize) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read corpus {}: {}", path.display(), e))
        })?;

        let file: CorpusFile = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        let corpus = Self::from_documents(file.documents, passage_chars);
        tracing::info!(
            "Loaded corpus {} ({} passages)",
            path.display(),
            corpus.len()
        );
        Ok(corpus)
    }

    /// Build a corpus from documents already in memory.
    pub fn from_documents(documents: Vec<CorpusDocument>, passage_chars: usize) -> Self {
        let passages = documents
            .iter()
            .flat_map(|doc| {
                split_into_passages(&doc.id, &doc.text, passage_chars)
                    .into_iter()
                    .map(move |chunk| {
                        let searchable = match &doc.title {
                            Some(title) => format!("{} {}", title, chunk.text),
                            None => chunk.text.clone(),
                        };
                        IndexedPassage {
                            source_id: chunk.source_id,
                            title: doc.title.clone(),
                            terms: term_set(&searchable),
                            text: chunk.text,
                        }
                    })
            })
            .collect();

        Self { passages }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait::async_trait]
impl SearchBackend for LocalCorpus {
    fn name(&self) -> &str {
        "local"
    }

    fn score_scale(&self) -> ScoreScale {
        ScoreScale::Unit
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<SearchResults> {
        let query_terms = term_set(query);

        let mut scored: Vec<(usize, f32)> = self
            .passages
            .iter()
            .enumerate()
            .map(|(idx, passage)| (idx, coverage(&query_terms, &passage.terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Corpus order breaks ties so results are reproducible
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);

        let hits = scored
            .into_iter()
            .map(|(idx, score)| {
                let passage = &self.passages[idx];
                let hit = SearchHit::new(passage.source_id.clone(), passage.text.clone(), score);
                match &passage.title {
                    Some(title) => hit.with_title(title.clone()),
                    None => hit,
                }
            })
            .collect();

        Ok(SearchResults::new(hits))
    }
}
