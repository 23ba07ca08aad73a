//! The embedding capability: text in, fixed-dimension vector out.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};

use crate::error::{RagError, Result};

/// Maps text to vectors of a fixed dimension.
///
/// Implementations wrap specific embedding backends (OpenAI, a local ONNX
/// model, a deterministic test fake) behind a single-method capability. The
/// default [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::EmbeddingProvider;
///
/// let provider: Arc<dyn EmbeddingProvider> = Arc::new(FastEmbedProvider::new()?);
/// let vector = provider.embed("Which model is used for embedding?").await?;
/// assert_eq!(vector.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Failures are reported as `RagError::EmbeddingError`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Name used in error reports.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Embed `texts` in batches of `batch_size`, with at most `concurrency`
/// batches in flight.
///
/// Output order matches input order. The first failure aborts the whole
/// call, including a batch whose vector count or length disagrees with
/// [`EmbeddingProvider::dimensions`].
pub async fn embed_concurrently(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>> {
    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size.max(1)))
        .map(|batch| async move {
            let vectors = provider.embed_batch(batch).await?;
            check_batch(provider, batch.len(), &vectors)?;
            Ok::<_, RagError>(vectors)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(batches.into_iter().flatten().collect())
}

fn check_batch(provider: &dyn EmbeddingProvider, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    let failure = |message: String| RagError::EmbeddingError { provider: provider.name().to_string(), message };
    if vectors.len() != expected {
        return Err(failure(format!("returned {} vectors for {expected} inputs", vectors.len())));
    }
    let dimensions = provider.dimensions();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(failure(format!("returned a {}-dimensional vector, expected {dimensions}", bad.len())));
    }
    Ok(())
}
