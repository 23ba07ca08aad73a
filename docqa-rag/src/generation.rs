//! Generation provider trait: an opaque text-completion call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// The fully assembled prompt.
    pub prompt: String,
    /// Sampling temperature. [`RagPipeline::answer`](crate::RagPipeline::answer) always sends 0.
    pub temperature: f32,
}

/// The provider's answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    /// The completion text.
    pub text: String,
}

/// A text-completion service.
///
/// Failures are reported as [`RagError::GenerationError`](crate::RagError::GenerationError)
/// carrying the status or cause. Implementations must not retry internally;
/// the pipeline bounds every call with a timeout.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Complete the prompt in `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;
}
