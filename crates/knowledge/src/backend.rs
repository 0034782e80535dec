//! Retrieval capability trait.

use crate::types::{ScoreScale, SearchResults};
use ragent_core::AppResult;

/// An external search capability.
///
/// Implementations return hits in their own rank order with backend-native
/// scores; the [`RetrieverAdapter`](crate::RetrieverAdapter) normalises,
/// deduplicates and truncates them.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync + std::fmt::Debug {
    /// Backend name, recorded as the passage origin (e.g., "wikipedia", "local")
    fn name(&self) -> &str;

    /// How raw scores map onto [0, 1]
    fn score_scale(&self) -> ScoreScale;

    /// Search for up to `limit` hits.
    ///
    /// Connectivity problems are errors; no matches is an empty result.
    async fn search(&self, query: &str, limit: usize) -> AppResult<SearchResults>;
}
