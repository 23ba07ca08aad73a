//! Error types for the `docqa-rag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in retrieval, indexing, generation and evaluation.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration. Fatal, never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation service failed or returned an unusable response.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// The underlying cause, including HTTP status where available.
        message: String,
    },

    /// The generation service did not answer within the configured bound.
    #[error("Generation timed out after {timeout:?}")]
    GenerationTimeout {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// Vectors of different lengths were mixed in one index or query.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The index (or first vector) dimension.
        expected: usize,
        /// The offending vector's dimension.
        actual: usize,
    },

    /// An operation that needs at least one element received none.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Paired sequences had different lengths.
    #[error("Length mismatch: {predictions} predictions vs {expected} expected answers")]
    LengthMismatch {
        /// Number of predictions supplied.
        predictions: usize,
        /// Number of expected answers supplied.
        expected: usize,
    },

    /// No persisted index exists at the given location.
    #[error("No persisted index found at {}", path.display())]
    NotFound {
        /// The index directory that was probed.
        path: PathBuf,
    },

    /// The pipeline has no (or an empty) index to retrieve from.
    #[error("Index not ready: build or load an index before querying")]
    NotReady,

    /// A persisted index exists but its files disagree or are malformed.
    #[error("Corrupt index at {}: {message}", path.display())]
    CorruptIndex {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// A single document could not be read or parsed.
    #[error("Failed to load document {}: {message}", path.display())]
    DocumentLoad {
        /// The document path.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// I/O failure while reading or writing index files.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure encoding or decoding JSON.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the caller may reasonably retry, skip or rebuild instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingError { .. }
                | RagError::GenerationError { .. }
                | RagError::GenerationTimeout { .. }
                | RagError::NotFound { .. }
                | RagError::NotReady
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_conditions_are_recoverable() {
        assert!(RagError::NotReady.is_recoverable());
        assert!(RagError::NotFound { path: PathBuf::from("vector_store") }.is_recoverable());
        assert!(
            RagError::GenerationTimeout { timeout: Duration::from_secs(1) }.is_recoverable()
        );
    }

    #[test]
    fn data_errors_are_fatal() {
        assert!(!RagError::DimensionMismatch { expected: 3, actual: 4 }.is_recoverable());
        assert!(!RagError::ConfigError("bad".into()).is_recoverable());
        assert!(!RagError::LengthMismatch { predictions: 1, expected: 2 }.is_recoverable());
    }

    #[test]
    fn messages_carry_details() {
        let err = RagError::DimensionMismatch { expected: 3, actual: 4 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 4");
    }
}
