//! Retrieval capability for RAGent.
//!
//! Search backends (Wikipedia, local corpus) behind the [`SearchBackend`]
//! trait, passage splitting, lexical scoring and the [`RetrieverAdapter`]
//! that turns raw hits into ranked, deduplicated passages.

pub mod backend;
pub mod backends;
pub mod chunker;
pub mod lexical;
pub mod retriever;
pub mod types;

pub use backend::SearchBackend;
pub use backends::{create_backend, CorpusDocument, LocalCorpus, WikipediaBackend};
pub use chunker::{split_into_passages, DocumentChunk};
pub use retriever::{rank_passages, Retrieval, RetrieverAdapter, RetrieverOptions};
pub use types::{Passage, ScoreScale, SearchHit, SearchResults};
