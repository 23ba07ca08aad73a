//! Query-time retrieval: embed the query, search the index, fit the context budget.

use std::sync::Arc;

use tracing::debug;

use crate::config::RagConfig;
use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::{SimilarityMetric, VectorIndex};

/// Separator placed between chunk texts when they are assembled into a prompt.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Embeds queries and ranks index entries against them.
///
/// Holds configuration only; the index is passed per call so that a fresh
/// snapshot is used every time.
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    metric: SimilarityMetric,
}

impl Retriever {
    /// Create a retriever returning `top_k` results ranked by `metric`.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        metric: SimilarityMetric,
    ) -> Self {
        Self { embedding_provider, top_k, metric }
    }

    /// Create a retriever using the configured `top_k` and metric.
    pub fn from_config(embedding_provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self::new(embedding_provider, config.top_k, config.metric)
    }

    /// Number of results requested from the index.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The ranking metric.
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Embed `query` and return the top-k results from `index`.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::EmbeddingError`](crate::RagError::EmbeddingError)
    /// from the provider and
    /// [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch) if the
    /// provider's vectors do not match the index.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedding_provider.embed(query).await?;
        let results = index.search(&query_embedding, self.top_k, self.metric)?;
        debug!(query_len = query.len(), result_count = results.len(), metric = %self.metric, "retrieved");
        Ok(results)
    }
}

/// Drop results from the lowest-ranked end until the assembled context fits
/// in `budget` characters. Order is never changed.
///
/// Sizes count chunk characters plus [`CONTEXT_SEPARATOR`] between chunks.
pub fn fit_to_budget(mut results: Vec<SearchResult>, budget: usize) -> Vec<SearchResult> {
    let separator = CONTEXT_SEPARATOR.chars().count();
    let mut total: usize = results.iter().map(|r| r.chunk.text.chars().count()).sum::<usize>()
        + separator * results.len().saturating_sub(1);
    while total > budget {
        let Some(dropped) = results.pop() else { break };
        total -= dropped.chunk.text.chars().count();
        if !results.is_empty() {
            total -= separator;
        }
    }
    results
}

/// Concatenate chunk texts in ranked order.
pub fn assemble_context(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}
