//! # docqa-rag
//!
//! Retrieval-augmented question answering over a local document collection.
//!
//! ## Overview
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! flat vector index that is persisted to disk. A query is embedded with the
//! same model, the top-k chunks are retrieved and trimmed to a context budget,
//! and a single prompt is sent to a generation service. An evaluation harness
//! scores retrieval (precision/recall/F1) and answers (exact match).
//!
//! ## Features
//!
//! - `openai`: embedding and chat-completion providers for OpenAI-compatible APIs
//! - `fastembed`: local `all-MiniLM-L6-v2` embeddings via ONNX Runtime
//! - `full`: both of the above
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{DocumentLoader, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::builder().top_k(3).build()?)
//!     .embedding_provider(Arc::new(embedder))
//!     .generation_provider(Arc::new(llm))
//!     .build()?;
//!
//! pipeline
//!     .load_or_ingest(false, || Ok(DocumentLoader::new().load_dir("documents")?.documents))
//!     .await?;
//! let answer = pipeline.answer("Which model is used for embedding?").await?;
//! println!("{}", answer.answer);
//! ```

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod generation;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod shared;
pub mod store;

#[cfg(feature = "fastembed")]
pub mod fastembed;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, IndexEntry, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use eval::{
    AnswerMetrics, ComparisonTable, ConfigMetrics, EvalCase, EvaluationRecord, EvaluationReport,
    Evaluator, RetrievalMetrics, answer_metrics, compare, retrieval_metrics,
};
pub use generation::{GenerationProvider, GenerationRequest, GenerationResponse};
pub use index::{SimilarityMetric, VectorIndex};
pub use loader::{DocumentLoader, DocumentParser, LoadReport, PlainTextParser};
pub use pipeline::{IndexOrigin, RagAnswer, RagPipeline, RagPipelineBuilder};
pub use prompt::{
    ConstantClassifier, KeywordClassifier, PromptLibrary, PromptTemplate, QueryClassifier,
    TemplateKind,
};
pub use retriever::Retriever;
pub use shared::SharedIndex;
pub use store::IndexStore;
