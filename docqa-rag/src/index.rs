//! Exact nearest-neighbour vector index.
//!
//! [`VectorIndex`] is an immutable arena: vectors live in one flat `Vec<f32>`
//! and the chunk at position `i` belongs to the vector at rows
//! `i * dimension .. (i + 1) * dimension`. Positions are stable insertion
//! indices; rebuilding produces a new arena rather than patching this one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, IndexEntry, SearchResult};
use crate::error::{RagError, Result};

/// How query and stored vectors are compared. Higher scores rank first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine of the angle between the vectors; `0.0` if either has zero magnitude.
    #[default]
    Cosine,
    /// Negated squared Euclidean distance.
    NegSquaredEuclidean,
    /// Raw inner product.
    DotProduct,
}

impl SimilarityMetric {
    /// Score `a` against `b`. Both slices must have the same length.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let score = match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::NegSquaredEuclidean => {
                -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>()
            }
            SimilarityMetric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        };
        // NaN would sort unpredictably; rank it last instead.
        if score.is_nan() { f32::NEG_INFINITY } else { score }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::NegSquaredEuclidean => "euclidean",
            SimilarityMetric::DotProduct => "dot",
        };
        f.write_str(name)
    }
}

impl FromStr for SimilarityMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "euclidean" | "l2" | "neg_squared_euclidean" => {
                Ok(SimilarityMetric::NegSquaredEuclidean)
            }
            "dot" | "dot_product" | "inner_product" => Ok(SimilarityMetric::DotProduct),
            other => Err(RagError::ConfigError(format!(
                "unknown similarity metric '{other}' (expected cosine, euclidean or dot)"
            ))),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// An immutable collection of embedded chunks supporting exact top-k search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Build an index from `(vector, chunk)` entries, keeping their order.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] if `entries` is empty or the vectors have no components
    /// - [`RagError::DimensionMismatch`] if any vector's length differs from the first
    pub fn build(entries: impl IntoIterator<Item = IndexEntry>) -> Result<Self> {
        let mut entries = entries.into_iter().peekable();
        let dimension = match entries.peek() {
            Some(first) => first.vector.len(),
            None => return Err(RagError::EmptyInput("cannot build an index from no entries".into())),
        };
        if dimension == 0 {
            return Err(RagError::EmptyInput("index vectors must have at least one dimension".into()));
        }

        let (lower, _) = entries.size_hint();
        let mut vectors = Vec::with_capacity(lower * dimension);
        let mut chunks = Vec::with_capacity(lower);
        for entry in entries {
            if entry.vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            vectors.extend_from_slice(&entry.vector);
            chunks.push(entry.chunk);
        }

        Ok(Self { dimension, vectors, chunks })
    }

    /// Reassemble an index from a flat vector arena, as read back from disk.
    pub(crate) fn from_parts(dimension: usize, vectors: Vec<f32>, chunks: Vec<Chunk>) -> Self {
        debug_assert_eq!(vectors.len(), dimension * chunks.len());
        Self { dimension, vectors, chunks }
    }

    /// The shared dimensionality of every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The flat vector arena, row-major.
    pub(crate) fn raw_vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// The vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Iterate `(vector, chunk)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&[f32], &Chunk)> {
        self.vectors.chunks_exact(self.dimension).zip(self.chunks.iter())
    }

    /// Return the `k` entries scoring highest against `query`.
    ///
    /// Results are sorted by descending score; equal scores keep insertion
    /// order. A `k` larger than the index returns every entry.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if `query.len() != self.dimension()`
    /// - [`RagError::ConfigError`] if `k == 0`
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Err(RagError::ConfigError("k must be greater than zero".to_string()));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|vector| metric.score(vector, query))
            .enumerate()
            .collect();

        // `sort_by` is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| SearchResult { chunk: self.chunks[position].clone(), score })
            .collect())
    }
}
