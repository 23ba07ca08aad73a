//! `docqa`: chat with, index and evaluate a local document collection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use docqa_rag::openai::{GROQ_BASE_URL, OpenAIGenerationProvider};
use docqa_rag::{
    DocumentLoader, EmbeddingProvider, Evaluator, IndexOrigin, RagAnswer, RagConfig, RagError,
    RagPipeline, SimilarityMetric, compare, eval,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Retrieval-augmented question answering over your documents")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive question loop (the default)
    Chat,
    /// Answer a single question and list its sources
    Ask {
        /// The question to answer
        query: String,
    },
    /// Load the persisted index, or build it from the documents directory
    Index {
        /// Rebuild even if a persisted index exists
        #[arg(long)]
        rebuild: bool,
    },
    /// Score retrieval and answers against labelled queries
    Evaluate {
        /// JSON array of {query, expected_doc_ids, expected_answer}
        #[arg(long)]
        cases: PathBuf,
        /// Configuration name shown in the comparison table
        #[arg(long, default_value = "default")]
        name: String,
    },
}

#[derive(Args, Debug)]
struct Settings {
    /// Directory of the persisted vector index
    #[arg(long, env = "VECTOR_DB_PATH", default_value = "vector_store", global = true)]
    vector_db_path: PathBuf,

    /// Directory scanned for documents when building the index
    #[arg(long, env = "DOCUMENTS_DIR", default_value = "documents", global = true)]
    documents_dir: PathBuf,

    /// Embedding model identifier
    #[arg(long, env = "EMBEDDING_MODEL", default_value = docqa_rag::config::DEFAULT_EMBEDDING_MODEL, global = true)]
    embedding_model: String,

    /// Maximum chunk size in characters
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 500, global = true)]
    chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 50, global = true)]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, env = "MAX_RETRIEVALS", default_value_t = 5, global = true)]
    top_k: usize,

    /// Similarity metric: cosine, euclidean or dot
    #[arg(long, default_value = "cosine", global = true)]
    metric: SimilarityMetric,

    /// Maximum context characters placed in the prompt
    #[arg(long, default_value_t = 4000, global = true)]
    context_budget: usize,

    /// Generation model name
    #[arg(long, env = "LLM_MODEL", default_value = docqa_rag::config::DEFAULT_GENERATION_MODEL, global = true)]
    llm_model: String,

    /// Base URL of the OpenAI-compatible generation API
    #[arg(long, env = "BASE_URL", default_value = GROQ_BASE_URL, global = true)]
    base_url: String,

    /// Seconds to wait for one generation call
    #[arg(long, default_value_t = 60, global = true)]
    timeout_secs: u64,

    /// API key for the generation service
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, global = true)]
    groq_api_key: Option<String>,

    /// API key for the OpenAI embeddings endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_api_key: Option<String>,
}

impl Settings {
    fn rag_config(&self) -> Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .metric(self.metric)
            .embedding_model(&self.embedding_model)
            .vector_store_path(&self.vector_db_path)
            .context_budget(self.context_budget)
            .generation_model(&self.llm_model)
            .generation_timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .context("invalid configuration")
    }

    #[cfg(feature = "local-embeddings")]
    fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        use docqa_rag::fastembed::FastEmbedProvider;

        if self.embedding_model != docqa_rag::config::DEFAULT_EMBEDDING_MODEL {
            bail!("local embeddings only support {}", docqa_rag::config::DEFAULT_EMBEDDING_MODEL);
        }
        Ok(Arc::new(FastEmbedProvider::new()?))
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn embedding_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        use docqa_rag::openai::OpenAIEmbeddingProvider;

        let key = self
            .openai_api_key
            .clone()
            .context("OPENAI_API_KEY must be set (or build with --features local-embeddings)")?;
        Ok(Arc::new(OpenAIEmbeddingProvider::new(key)?.with_model(&self.embedding_model)))
    }

    fn pipeline(&self) -> Result<RagPipeline> {
        let key = self.groq_api_key.clone().context("GROQ_API_KEY must be set for answer generation")?;
        let llm = OpenAIGenerationProvider::new(key)?.with_base_url(&self.base_url);
        info!(embedding_model = %self.embedding_model, llm_model = %self.llm_model, "initialising pipeline");

        Ok(RagPipeline::builder()
            .config(self.rag_config()?)
            .embedding_provider(self.embedding_provider()?)
            .generation_provider(Arc::new(llm))
            .build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let pipeline = cli.settings.pipeline()?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            prepare_index(&pipeline, &cli.settings.documents_dir, false).await?;
            chat(&pipeline).await
        }
        Command::Ask { query } => {
            prepare_index(&pipeline, &cli.settings.documents_dir, false).await?;
            let answer = pipeline.answer(&query).await?;
            print_answer(&answer);
            Ok(())
        }
        Command::Index { rebuild } => prepare_index(&pipeline, &cli.settings.documents_dir, rebuild).await,
        Command::Evaluate { cases, name } => {
            prepare_index(&pipeline, &cli.settings.documents_dir, false).await?;
            evaluate(&pipeline, &cases, name).await
        }
    }
}

async fn prepare_index(pipeline: &RagPipeline, documents_dir: &Path, rebuild: bool) -> Result<()> {
    let origin = pipeline
        .load_or_ingest(rebuild, || {
            let report = DocumentLoader::new().load_dir(documents_dir)?;
            if !report.failures.is_empty() {
                warn!(skipped = report.failures.len(), "some documents could not be loaded");
            }
            Ok(report.documents)
        })
        .await;

    match origin {
        Ok(IndexOrigin::Loaded { chunks }) => println!("Loaded index with {chunks} chunks."),
        Ok(IndexOrigin::Built { chunks }) => println!("Built index with {chunks} chunks."),
        Err(RagError::EmptyInput(_)) => bail!(
            "No documents loaded. Make sure '{}' contains .txt or .md files.",
            documents_dir.display()
        ),
        Err(e) => return Err(e).context("failed to prepare the index"),
    }
    Ok(())
}

async fn chat(pipeline: &RagPipeline) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("\nRAG system initialised. Enter a query or type 'quit' to exit.");

    loop {
        let line = match editor.readline("\nYour query: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        let _ = editor.add_history_entry(query);

        match pipeline.answer(query).await {
            Ok(answer) => print_answer(&answer),
            Err(e) if e.is_recoverable() => eprintln!("\nCould not answer: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    println!("\nExiting.");
    Ok(())
}

fn print_answer(answer: &RagAnswer) {
    let rule = "=".repeat(50);
    println!("\n{rule}\nANSWER:\n{}\n{rule}", answer.answer.trim());
    if !answer.sources.is_empty() {
        println!("Sources:");
        for (chunk, score) in answer.sources.iter().zip(&answer.scores) {
            println!("  [{score:.3}] {} ({})", chunk.source(), chunk.id);
        }
    }
}

async fn evaluate(pipeline: &RagPipeline, cases: &Path, name: String) -> Result<()> {
    let cases = eval::load_cases(cases).with_context(|| format!("failed to read {}", cases.display()))?;
    let report = Evaluator.run(pipeline, &cases).await?;

    println!("\n{report}\n");
    let table = compare(&BTreeMap::from([(name, report.summary())]));
    println!("{table}");
    Ok(())
}
