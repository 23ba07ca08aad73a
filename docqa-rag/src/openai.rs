//! Providers for OpenAI-compatible HTTP APIs (OpenAI, Groq, local gateways).
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, GenerationRequest, GenerationResponse};

/// Base URL of the OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Base URL of Groq's OpenAI-compatible API.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Which error variant a failed call maps to.
#[derive(Clone, Copy)]
enum Stage {
    Embedding,
    Generation,
}

/// Authenticated JSON client for one base URL.
#[derive(Clone)]
struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    provider: &'static str,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ApiClient {
    fn new(api_key: String, base_url: &str, provider: &'static str, stage: Stage) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Self::failure(provider, stage, "API key must not be empty".to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            provider,
        })
    }

    fn failure(provider: &str, stage: Stage, message: String) -> RagError {
        let provider = provider.to_string();
        match stage {
            Stage::Embedding => RagError::EmbeddingError { provider, message },
            Stage::Generation => RagError::GenerationError { provider, message },
        }
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        stage: Stage,
    ) -> Result<R> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.post(&url).bearer_auth(&self.api_key).json(body).send().await.map_err(|e| {
            error!(provider = self.provider, %url, error = %e, "request failed");
            Self::failure(self.provider, stage, format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(provider = self.provider, %status, "API error");
            return Err(Self::failure(self.provider, stage, format!("API returned {status}: {detail}")));
        }

        response.json().await.map_err(|e| {
            error!(provider = self.provider, error = %e, "failed to parse response");
            Self::failure(self.provider, stage, format!("failed to parse response: {e}"))
        })
    }
}

fn api_key_from_env(var: &str, provider: &'static str, stage: Stage) -> Result<String> {
    std::env::var(var).map_err(|_| ApiClient::failure(provider, stage, format!("{var} environment variable not set")))
}

// ── Embeddings ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// An [`EmbeddingProvider`] calling `POST {base_url}/embeddings`.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_model("text-embedding-3-large");
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: ApiClient,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the OpenAI API using `text-embedding-3-small`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(api_key.into(), OPENAI_BASE_URL, "OpenAI", Stage::Embedding)?,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env("OPENAI_API_KEY", "OpenAI", Stage::Embedding)?)
    }

    /// Point the provider at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.client.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request truncated embeddings of `dims` dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text]).await?.into_iter().next().ok_or_else(|| {
            ApiClient::failure(self.client.provider, Stage::Embedding, "API returned no embedding".into())
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = self.client.provider, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request = EmbeddingRequest { model: &self.model, input: texts, dimensions: self.request_dimensions };
        let mut response: EmbeddingResponse = self.client.post("embeddings", &request, Stage::Embedding).await?;
        if response.data.len() != texts.len() {
            return Err(ApiClient::failure(
                self.client.provider,
                Stage::Embedding,
                format!("expected {} embeddings, got {}", texts.len(), response.data.len()),
            ));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        self.client.provider
    }
}

// ── Chat completions ───────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// A [`GenerationProvider`] calling `POST {base_url}/chat/completions`.
///
/// The prompt is sent as a single user message. Defaults to Groq's endpoint;
/// use [`with_base_url`](Self::with_base_url) for OpenAI or a local server.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIGenerationProvider;
///
/// let llm = OpenAIGenerationProvider::new(std::env::var("GROQ_API_KEY")?)?;
/// ```
pub struct OpenAIGenerationProvider {
    client: ApiClient,
}

impl OpenAIGenerationProvider {
    /// Create a provider for Groq's OpenAI-compatible API.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self { client: ApiClient::new(api_key.into(), GROQ_BASE_URL, "OpenAI-compatible", Stage::Generation)? })
    }

    /// Create a provider using the `GROQ_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env("GROQ_API_KEY", "OpenAI-compatible", Stage::Generation)?)
    }

    /// Point the provider at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.client.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    /// Set a per-request HTTP timeout, in addition to the pipeline's bound.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client.http = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            ApiClient::failure(self.client.provider, Stage::Generation, format!("failed to build client: {e}"))
        })?;
        Ok(self)
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerationProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        debug!(provider = self.client.provider, model = %request.model, prompt_len = request.prompt.len(), "generating");

        let body = ChatRequest {
            model: &request.model,
            messages: [ChatMessage { role: "user", content: &request.prompt }],
            temperature: request.temperature,
        };
        let response: ChatResponse = self.client.post("chat/completions", &body, Stage::Generation).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ApiClient::failure(self.client.provider, Stage::Generation, "API returned no choices".into())
            })?;
        Ok(GenerationResponse { text })
    }

    fn name(&self) -> &str {
        self.client.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::EmbeddingError { .. })));
        assert!(matches!(OpenAIGenerationProvider::new("  "), Err(RagError::GenerationError { .. })));
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let provider = OpenAIGenerationProvider::new("key").unwrap().with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn chat_request_serialises_as_single_user_message() {
        let body = ChatRequest {
            model: "llama3-8b-8192",
            messages: [ChatMessage { role: "user", content: "hi" }],
            temperature: 0.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["temperature"], 0.0);
    }
}
