//! End-to-end pipeline and evaluator tests against in-process fake providers.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    Document, EmbeddingProvider, EvalCase, Evaluator, GenerationProvider, GenerationRequest,
    GenerationResponse, IndexOrigin, RagConfig, RagError, RagPipeline, Result, SharedIndex,
    TemplateKind, VectorIndex,
};

const VOCAB: &[&str] = &["alpha", "beta", "embedding", "model", "lab", "objective", "system"];

/// Bag-of-words over a tiny vocabulary. Fails on texts containing "poison".
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("poison") {
            return Err(RagError::EmbeddingError { provider: "fake".into(), message: "poisoned".into() });
        }
        let mut vector = vec![0.0; VOCAB.len()];
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if let Some(i) = VOCAB.iter().position(|v| *v == word) {
                vector[i] += 1.0;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        VOCAB.len()
    }
}

/// Claims three dimensions but returns five.
struct MisreportingEmbedder;

#[async_trait]
impl EmbeddingProvider for MisreportingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0; 5])
    }

    fn dimensions(&self) -> usize {
        3
    }
}

/// Records every request and replies with a fixed answer.
#[derive(Default)]
struct RecordingLlm {
    reply: String,
    calls: AtomicUsize,
    last: Mutex<Option<GenerationRequest>>,
}

impl RecordingLlm {
    fn replying(reply: &str) -> Self {
        Self { reply: reply.to_string(), ..Default::default() }
    }
}

#[async_trait]
impl GenerationProvider for RecordingLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        Ok(GenerationResponse { text: self.reply.clone() })
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct SlowLlm;

#[async_trait]
impl GenerationProvider for SlowLlm {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(GenerationResponse { text: "too late".into() })
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Fails with an HTTP-like error, or with an I/O error when the prompt
/// mentions "objective".
struct FailingLlm;

#[async_trait]
impl GenerationProvider for FailingLlm {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        if request.prompt.contains("objective") {
            return Err(RagError::Io(std::io::Error::other("connection reset")));
        }
        Err(RagError::GenerationError { provider: "failing".into(), message: "API returned 503".into() })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn documents() -> Vec<Document> {
    vec![
        Document::new(
            "config",
            "The embedding model is all-MiniLM. The model runs locally.",
            "documents/config.txt",
            "txt",
        ),
        Document::new("lab6", "Lab six objective: build a retrieval system.", "documents/lab6.txt", "txt"),
    ]
}

fn config(store: &Path) -> RagConfig {
    RagConfig::builder()
        .top_k(1)
        .vector_store_path(store.join("vector_store"))
        .generation_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn pipeline(store: &Path, llm: Arc<dyn GenerationProvider>) -> RagPipeline {
    RagPipeline::builder()
        .config(config(store))
        .embedding_provider(Arc::new(KeywordEmbedder))
        .generation_provider(llm)
        .build()
        .unwrap()
}

/// A pipeline whose index is installed in memory, without touching disk.
async fn preloaded(llm: Arc<dyn GenerationProvider>) -> RagPipeline {
    let config = RagConfig::builder().top_k(1).generation_timeout(Duration::from_secs(5)).build().unwrap();
    preloaded_with(config, llm).await
}

async fn preloaded_with(config: RagConfig, llm: Arc<dyn GenerationProvider>) -> RagPipeline {
    let mut entries = Vec::new();
    for doc in documents() {
        let vector = KeywordEmbedder.embed(&doc.text).await.unwrap();
        let chunk = docqa_rag::Chunk {
            id: format!("{}_0", doc.id),
            text: doc.text.clone(),
            source_document_id: doc.id.clone(),
            offset: 0,
            metadata: doc.metadata.clone(),
        };
        entries.push(docqa_rag::IndexEntry::new(vector, chunk));
    }
    let index = Arc::new(SharedIndex::with_index(VectorIndex::build(entries).unwrap()));
    RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(KeywordEmbedder))
        .generation_provider(llm)
        .index(index)
        .build()
        .unwrap()
}

#[test]
fn builder_requires_providers() {
    let err = RagPipeline::builder().config(RagConfig::default()).build().err().unwrap();
    assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("embedding_provider")));
}

#[tokio::test]
async fn answer_without_index_is_not_ready_and_skips_generation() {
    let temp = tempfile::TempDir::new().unwrap();
    let llm = Arc::new(RecordingLlm::replying("unused"));
    let pipeline = pipeline(temp.path(), llm.clone());

    let err = pipeline.answer("Which model is used for embedding?").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ingest_then_answer_uses_retrieved_context() {
    let temp = tempfile::TempDir::new().unwrap();
    let llm = Arc::new(RecordingLlm::replying("all-MiniLM-L6-v2"));
    let pipeline = pipeline(temp.path(), llm.clone());

    assert_eq!(pipeline.ingest(&documents()).await.unwrap(), 2);
    assert!(pipeline.store().exists());

    let answer = pipeline.answer("Which model is used for embedding?").await.unwrap();
    assert_eq!(answer.answer, "all-MiniLM-L6-v2");
    assert_eq!(answer.template, TemplateKind::General);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source(), "documents/config.txt");

    let request = llm.last.lock().unwrap().clone().unwrap();
    assert_eq!(request.temperature, 0.0);
    assert_eq!(request.model, "llama3-8b-8192");
    assert!(request.prompt.contains("The embedding model is all-MiniLM."));
    assert!(request.prompt.contains("Which model is used for embedding?"));
    assert!(!request.prompt.contains("Lab six"));
}

#[tokio::test]
async fn ingest_of_nothing_is_empty_input() {
    let temp = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline(temp.path(), Arc::new(RecordingLlm::default()));

    assert!(matches!(pipeline.ingest(&[]).await, Err(RagError::EmptyInput(_))));
    let blank = Document::new("blank", "", "documents/blank.txt", "txt");
    assert!(matches!(pipeline.ingest(&[blank]).await, Err(RagError::EmptyInput(_))));
    assert!(!pipeline.store().exists());
}

#[tokio::test]
async fn vectors_of_the_wrong_length_fail_ingestion() {
    let temp = tempfile::TempDir::new().unwrap();
    let pipeline = RagPipeline::builder()
        .config(config(temp.path()))
        .embedding_provider(Arc::new(MisreportingEmbedder))
        .generation_provider(Arc::new(RecordingLlm::default()))
        .build()
        .unwrap();

    let err = pipeline.ingest(&documents()).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { ref message, .. } if message.contains("expected 3")));
    assert!(!pipeline.store().exists());
    assert!(!pipeline.index().is_ready().await);
}

#[tokio::test]
async fn failed_ingest_keeps_the_previous_index() {
    let temp = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline(temp.path(), Arc::new(RecordingLlm::replying("ok")));
    pipeline.ingest(&documents()).await.unwrap();

    let poisoned = Document::new("bad", "alpha poison beta", "documents/bad.txt", "txt");
    let err = pipeline.ingest(&[poisoned]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));

    let current = pipeline.index().snapshot().await.unwrap();
    assert_eq!(current.len(), 2);
    assert_eq!(pipeline.store().load().unwrap().len(), 2);
}

#[tokio::test]
async fn load_or_ingest_builds_once_then_loads() {
    let temp = tempfile::TempDir::new().unwrap();
    let first = pipeline(temp.path(), Arc::new(RecordingLlm::default()));
    let origin = first.load_or_ingest(false, || Ok(documents())).await.unwrap();
    assert_eq!(origin, IndexOrigin::Built { chunks: 2 });

    let second = pipeline(temp.path(), Arc::new(RecordingLlm::default()));
    let origin = second
        .load_or_ingest(false, || Err(RagError::ConfigError("loader must not run".into())))
        .await
        .unwrap();
    assert_eq!(origin, IndexOrigin::Loaded { chunks: 2 });
    assert!(second.index().is_ready().await);

    let origin = second.load_or_ingest(true, || Ok(documents()[..1].to_vec())).await.unwrap();
    assert_eq!(origin, IndexOrigin::Built { chunks: 1 });
}

#[tokio::test]
async fn budget_smaller_than_every_chunk_skips_generation() {
    // The installed chunks were built with a larger chunk size than this config allows.
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(5).context_budget(20).top_k(1).build().unwrap();
    let llm = Arc::new(RecordingLlm::replying("unused"));
    let pipeline = preloaded_with(config, llm.clone()).await;

    let err = pipeline.answer("Which embedding model?").await.unwrap_err();
    assert!(matches!(err, RagError::ConfigError(ref m) if m.contains("context_budget (20)")));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn sub_second_timeout_is_enforced() {
    let config = RagConfig::builder().top_k(1).generation_timeout(Duration::from_millis(250)).build().unwrap();
    let pipeline = preloaded_with(config, Arc::new(SlowLlm)).await;
    let err = pipeline.answer("Which model is used for embedding?").await.unwrap_err();
    assert!(matches!(err, RagError::GenerationTimeout { timeout } if timeout == Duration::from_millis(250)));
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let pipeline = preloaded(Arc::new(SlowLlm)).await;
    let err = pipeline.answer("Which model is used for embedding?").await.unwrap_err();
    assert!(matches!(err, RagError::GenerationTimeout { timeout } if timeout == Duration::from_secs(5)));
}

#[tokio::test]
async fn generation_failures_surface_as_generation_errors() {
    let pipeline = preloaded(Arc::new(FailingLlm)).await;

    let err = pipeline.answer("Which model is used for embedding?").await.unwrap_err();
    assert!(matches!(err, RagError::GenerationError { ref message, .. } if message.contains("503")));

    let err = pipeline.answer("What is the lab objective?").await.unwrap_err();
    assert!(
        matches!(err, RagError::GenerationError { ref provider, ref message } if provider == "failing" && message.contains("connection reset"))
    );
}

fn cases() -> Vec<EvalCase> {
    vec![
        EvalCase {
            query: "Which model is used for embedding?".into(),
            expected_doc_ids: BTreeSet::from(["documents/config.txt".to_string()]),
            expected_answer: "all-MiniLM-L6-v2".into(),
        },
        EvalCase {
            query: "What is the objective of the lab?".into(),
            expected_doc_ids: BTreeSet::from(["documents/lab6.txt".to_string()]),
            expected_answer: "To build a retrieval system.".into(),
        },
    ]
}

#[tokio::test]
async fn evaluator_scores_retrieval_and_answers() {
    let pipeline = preloaded(Arc::new(RecordingLlm::replying(" ALL-MiniLM-L6-v2\n"))).await;
    let report = Evaluator.run(&pipeline, &cases()).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[1].retrieved_ids, BTreeSet::from(["documents/lab6.txt".to_string()]));
    assert_eq!(report.retrieval.precision, 1.0);
    assert_eq!(report.retrieval.recall, 1.0);
    assert_eq!(report.retrieval.f1, 1.0);
    assert_eq!(report.answers.exact_match_accuracy, 0.5);
}

#[tokio::test]
async fn evaluator_scores_failed_queries_as_empty() {
    let pipeline = preloaded(Arc::new(FailingLlm)).await;
    let report = Evaluator.run(&pipeline, &cases()).await.unwrap();

    assert!(report.records.iter().all(|r| r.retrieved_ids.is_empty() && r.predicted_answer.is_empty()));
    assert_eq!(report.retrieval.f1, 0.0);
    assert_eq!(report.answers.exact_match_accuracy, 0.0);
}

#[tokio::test]
async fn evaluator_aborts_when_not_ready() {
    let temp = tempfile::TempDir::new().unwrap();
    let pipeline = pipeline(temp.path(), Arc::new(RecordingLlm::default()));
    assert!(matches!(Evaluator.run(&pipeline, &cases()).await, Err(RagError::NotReady)));
}
