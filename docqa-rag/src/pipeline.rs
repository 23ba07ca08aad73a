//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates index construction (chunk → embed → build →
//! persist → swap) and question answering (retrieve → fit budget → pick
//! template → generate) by composing an [`EmbeddingProvider`], a
//! [`GenerationProvider`], a [`Chunker`] and a [`SharedIndex`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generation_provider(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! let answer = pipeline.answer("What is the objective of Lab 6?").await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, Document, IndexEntry, SearchResult};
use crate::embedding::{EmbeddingProvider, embed_concurrently};
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::prompt::{ConstantClassifier, PromptLibrary, QueryClassifier, TemplateKind};
use crate::retriever::{Retriever, assemble_context, fit_to_budget};
use crate::shared::SharedIndex;
use crate::store::IndexStore;

/// Temperature of every answer generation request.
const ANSWER_TEMPERATURE: f32 = 0.0;

/// The outcome of [`RagPipeline::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    /// The generated answer text.
    pub answer: String,
    /// Chunks placed in the prompt, in ranked order.
    pub sources: Vec<Chunk>,
    /// Scores of `sources`, index for index.
    pub scores: Vec<f32>,
    /// The template the query was answered with.
    pub template: TemplateKind,
}

/// Where the installed index came from after [`RagPipeline::load_or_ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Read back from the configured vector store path.
    Loaded {
        /// Number of indexed chunks.
        chunks: usize,
    },
    /// Built from freshly loaded documents and persisted.
    Built {
        /// Number of indexed chunks.
        chunks: usize,
    },
}

/// The RAG pipeline orchestrator. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generation_provider: Arc<dyn GenerationProvider>,
    chunker: Arc<dyn Chunker>,
    classifier: Arc<dyn QueryClassifier>,
    prompts: PromptLibrary,
    retriever: Retriever,
    index: Arc<SharedIndex>,
    store: IndexStore,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the shared index holder.
    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Return the on-disk store backing the index.
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Chunk, embed and index `documents`, replacing the current index.
    ///
    /// Returns the number of indexed chunks.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] if the documents produce no chunks
    /// - [`RagError::EmbeddingError`] if any chunk fails to embed, or the
    ///   provider returns vectors of the wrong count or length
    ///
    /// On error the previously installed index stays in place.
    pub async fn ingest(&self, documents: &[Document]) -> Result<usize> {
        let chunks: Vec<Chunk> = documents.iter().flat_map(|doc| self.chunker.chunk(doc)).collect();
        if chunks.is_empty() {
            return Err(RagError::EmptyInput("documents produced no chunks".to_string()));
        }
        info!(documents = documents.len(), chunk_count = chunks.len(), "chunked documents");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = embed_concurrently(
            self.embedding_provider.as_ref(),
            &texts,
            self.config.embedding_batch_size,
            self.config.embedding_concurrency,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "embedding failed during ingestion");
            e
        })?;

        let entries: Vec<IndexEntry> =
            vectors.into_iter().zip(chunks).map(|(vector, chunk)| IndexEntry::new(vector, chunk)).collect();
        let index = self.index.rebuild(entries, &self.store).await?;
        Ok(index.len())
    }

    /// Install the persisted index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] if nothing has been persisted yet.
    pub async fn load(&self) -> Result<usize> {
        Ok(self.index.load_from(&self.store).await?.len())
    }

    /// Load the persisted index, or build one from `documents` when there is
    /// none (or when `force_rebuild` is set).
    ///
    /// `documents` is only invoked when a build is needed.
    pub async fn load_or_ingest<F>(&self, force_rebuild: bool, documents: F) -> Result<IndexOrigin>
    where
        F: FnOnce() -> Result<Vec<Document>>,
    {
        if !force_rebuild {
            match self.load().await {
                Ok(chunks) => return Ok(IndexOrigin::Loaded { chunks }),
                Err(RagError::NotFound { path }) => {
                    info!(path = %path.display(), "no persisted index, building from documents");
                }
                Err(e) => return Err(e),
            }
        }

        let documents = documents()?;
        let chunks = self.ingest(&documents).await?;
        Ok(IndexOrigin::Built { chunks })
    }

    /// Retrieve the top-k chunks for `query` from the installed index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotReady`] if no non-empty index is installed.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let index = match self.index.snapshot().await {
            Some(index) if !index.is_empty() => index,
            _ => return Err(RagError::NotReady),
        };
        self.retriever.retrieve(&index, query).await
    }

    /// Answer `query` from retrieved context with a single generation call.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] without an index; the generator is not called
    /// - [`RagError::EmbeddingError`] if the query cannot be embedded
    /// - [`RagError::ConfigError`] if no retrieved chunk fits `context_budget`;
    ///   the generator is not called
    /// - [`RagError::GenerationError`] if the generation call fails
    /// - [`RagError::GenerationTimeout`] if it exceeds the configured bound
    pub async fn answer(&self, query: &str) -> Result<RagAnswer> {
        let results = self.retrieve(query).await?;
        let retrieved = results.len();
        let budget = self.config.context_budget;
        let results = fit_to_budget(results, budget);
        if results.is_empty() {
            error!(retrieved, budget, "no retrieved chunk fits the context budget");
            return Err(RagError::ConfigError(format!(
                "context_budget ({budget}) is smaller than the best retrieved chunk"
            )));
        }
        if results.len() < retrieved {
            warn!(retrieved, kept = results.len(), budget, "context truncated");
        }

        let template = self.classifier.classify(query);
        let context = assemble_context(&results);
        let prompt = self.prompts.get(template).render(&context, query);

        let request = GenerationRequest {
            model: self.config.generation_model.clone(),
            prompt,
            temperature: ANSWER_TEMPERATURE,
        };
        let timeout = self.config.generation_timeout();
        let provider = self.generation_provider.name().to_string();

        let response = match tokio::time::timeout(timeout, self.generation_provider.generate(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(provider = %provider, error = %e, "generation failed");
                return Err(match e {
                    e @ RagError::GenerationError { .. } => e,
                    other => RagError::GenerationError { provider, message: other.to_string() },
                });
            }
            Err(_) => {
                error!(provider = %provider, ?timeout, "generation timed out");
                return Err(RagError::GenerationTimeout { timeout });
            }
        };

        info!(template = %template, source_count = results.len(), "answered query");
        let (sources, scores) = results.into_iter().map(|r| (r.chunk, r.score)).unzip();
        Ok(RagAnswer { answer: response.text, sources, scores, template })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `generation_provider` are required.
/// The chunker defaults to a [`RecursiveChunker`] sized from the config, the
/// classifier to [`ConstantClassifier`], the prompts to [`PromptLibrary::default`],
/// and the index to a fresh [`SharedIndex`] persisted at `config.vector_store_path`.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    classifier: Option<Arc<dyn QueryClassifier>>,
    prompts: Option<PromptLibrary>,
    index: Option<Arc<SharedIndex>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the query classifier.
    pub fn classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Override the prompt templates.
    pub fn prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Share an existing index holder (e.g. between several pipelines).
    pub fn index(mut self, index: Arc<SharedIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the chunk parameters are invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::from_config(&config)?),
        };

        let retriever = Retriever::from_config(Arc::clone(&embedding_provider), &config);
        let store = IndexStore::new(config.vector_store_path.clone())
            .with_embedding_model(config.embedding_model.clone());

        Ok(RagPipeline {
            embedding_provider,
            generation_provider,
            chunker,
            classifier: self.classifier.unwrap_or_else(|| Arc::new(ConstantClassifier::default())),
            prompts: self.prompts.unwrap_or_default(),
            retriever,
            index: self.index.unwrap_or_default(),
            store,
            config,
        })
    }
}
