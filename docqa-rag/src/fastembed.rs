//! Local embeddings through `fastembed` (ONNX Runtime, no network at query time).
//!
//! This module is only available when the `fastembed` feature is enabled.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "fastembed";

fn failure(message: impl Into<String>) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message: message.into() }
}

/// An [`EmbeddingProvider`] running a sentence-transformers model in-process.
///
/// Inference is CPU-bound, so every call runs on the blocking thread pool.
/// The model is downloaded to the fastembed cache on first use.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::fastembed::FastEmbedProvider;
///
/// let provider = FastEmbedProvider::new()?; // all-MiniLM-L6-v2, 384 dimensions
/// ```
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load `all-MiniLM-L6-v2`.
    pub fn new() -> Result<Self> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    /// Load a specific fastembed model. Blocks while the model loads.
    pub fn with_model(model: EmbeddingModel) -> Result<Self> {
        let mut text_model = TextEmbedding::try_new(InitOptions::new(model.clone()))
            .map_err(|e| failure(format!("failed to load {model:?}: {e}")))?;

        let probe = text_model.embed(vec!["dimension probe"], None).map_err(|e| failure(e.to_string()))?;
        let dimensions = probe.first().map(Vec::len).ok_or_else(|| failure("model returned no embedding"))?;
        info!(model = ?model, dimensions, "loaded embedding model");

        Ok(Self { model: Arc::new(Mutex::new(text_model)), dimensions })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text]).await?.into_iter().next().ok_or_else(|| failure("model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| failure("model lock poisoned"))?;
            model.embed(owned, None).map_err(|e| failure(e.to_string()))
        })
        .await
        .map_err(|e| failure(format!("embedding task failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
