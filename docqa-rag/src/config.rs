//! Configuration for the retrieval pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::SimilarityMetric;

/// Default embedding model, the sentence-transformers MiniLM checkpoint.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default generation model served by the OpenAI-compatible endpoint.
pub const DEFAULT_GENERATION_MODEL: &str = "llama3-8b-8192";

/// Configuration parameters for the RAG pipeline.
///
/// Construct through [`RagConfig::builder()`] so that inconsistent values are
/// rejected before any chunking happens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Similarity metric used to rank search results.
    pub metric: SimilarityMetric,
    /// Identifier of the embedding model; recorded in the persisted index.
    pub embedding_model: String,
    /// Directory holding the persisted vector index.
    pub vector_store_path: PathBuf,
    /// Maximum number of context characters handed to the prompt.
    pub context_budget: usize,
    /// Model requested from the generation service.
    pub generation_model: String,
    /// Upper bound on a single generation call, in milliseconds.
    pub generation_timeout_ms: u64,
    /// Number of chunks sent to the embedding provider per call.
    pub embedding_batch_size: usize,
    /// How many embedding batches may be in flight during ingestion.
    pub embedding_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            metric: SimilarityMetric::Cosine,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            vector_store_path: PathBuf::from("vector_store"),
            context_budget: 4000,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            generation_timeout_ms: 60_000,
            embedding_batch_size: 32,
            embedding_concurrency: 4,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The generation timeout as a [`Duration`].
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the similarity metric.
    pub fn metric(mut self, metric: SimilarityMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the directory of the persisted vector index.
    pub fn vector_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vector_store_path = path.into();
        self
    }

    /// Set the context budget in characters.
    pub fn context_budget(mut self, budget: usize) -> Self {
        self.config.context_budget = budget;
        self
    }

    /// Set the generation model name.
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    /// Set the generation timeout. Precision below a millisecond is dropped.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set how many chunks are sent to the embedding provider per call.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set how many embedding batches may be in flight at once.
    pub fn embedding_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embedding_concurrency = concurrency;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `context_budget`, `embedding_batch_size` or `embedding_concurrency` is zero
    /// - `context_budget < chunk_size`
    /// - `embedding_model` or `generation_model` is blank
    /// - `generation_timeout` is under one millisecond
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if config.context_budget == 0 {
            return Err(RagError::ConfigError(
                "context_budget must be greater than zero".to_string(),
            ));
        }
        if config.context_budget < config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "context_budget ({}) must hold at least one chunk ({})",
                config.context_budget, config.chunk_size
            )));
        }
        if config.embedding_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if config.embedding_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embedding_concurrency must be greater than zero".to_string(),
            ));
        }
        if config.embedding_model.trim().is_empty() {
            return Err(RagError::ConfigError("embedding_model is required".to_string()));
        }
        if config.generation_model.trim().is_empty() {
            return Err(RagError::ConfigError("generation_model is required".to_string()));
        }
        if config.generation_timeout_ms == 0 {
            return Err(RagError::ConfigError(
                "generation_timeout must be at least one millisecond".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.metric, SimilarityMetric::Cosine);
        assert_eq!(config.embedding_batch_size, 32);
        assert_eq!(config.generation_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("chunk_overlap (100)")));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(RagConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().context_budget(0).build().is_err());
        assert!(RagConfig::builder().embedding_batch_size(0).build().is_err());
        assert!(RagConfig::builder().generation_timeout(Duration::ZERO).build().is_err());
        assert!(RagConfig::builder().generation_timeout(Duration::from_micros(900)).build().is_err());
    }

    #[test]
    fn budget_must_hold_one_chunk() {
        assert!(RagConfig::builder().chunk_size(500).context_budget(499).build().is_err());
        assert!(RagConfig::builder().chunk_size(500).context_budget(500).build().is_ok());
    }

    #[test]
    fn blank_models_are_rejected() {
        assert!(RagConfig::builder().embedding_model("  ").build().is_err());
        assert!(RagConfig::builder().generation_model("").build().is_err());
    }

    #[test]
    fn sub_second_timeout_is_kept() {
        let config = RagConfig::builder().generation_timeout(Duration::from_millis(500)).build().unwrap();
        assert_eq!(config.generation_timeout(), Duration::from_millis(500));
    }
}
