//! Data types for documents, chunks, index entries and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key naming the origin of a document (a file path for loaded files).
pub const SOURCE_KEY: &str = "source";

/// Metadata key naming the format the document was extracted from.
pub const FILE_TYPE_KEY: &str = "file_type";

/// A source document containing text content and metadata.
///
/// `metadata` always carries [`SOURCE_KEY`] and [`FILE_TYPE_KEY`] when the
/// document is created through [`Document::new`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with the mandatory `source` and `file_type` metadata.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        let metadata = HashMap::from([
            (SOURCE_KEY.to_string(), source.into()),
            (FILE_TYPE_KEY.to_string(), file_type.into()),
        ]);
        Self { id: id.into(), text: text.into(), metadata }
    }

    /// The document's origin identifier, if present.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A bounded, contiguous slice of a [`Document`]'s text.
///
/// Chunks are produced by a [`Chunker`](crate::chunking::Chunker) and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk (`{document_id}_{chunk_index}`).
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub source_document_id: String,
    /// Character offset of the chunk's first character in the parent text.
    pub offset: usize,
    /// Metadata inherited from the parent document plus `chunk_index`.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// The originating document's `source` metadata, falling back to its ID.
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or(&self.source_document_id)
    }
}

/// A [`Chunk`] paired with its embedding, as stored by the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The chunk's embedding.
    pub vector: Vec<f32>,
    /// The embedded chunk.
    pub chunk: Chunk,
}

impl IndexEntry {
    /// Pair a vector with its chunk.
    pub fn new(vector: Vec<f32>, chunk: Chunk) -> Self {
        Self { vector, chunk }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}
