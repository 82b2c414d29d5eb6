use async_trait::async_trait;
use thiserror::Error;

use vendedor_core::domain::conversation::Turn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    /// Oldest first, already trimmed to the prompt window.
    pub history: Vec<Turn>,
    pub user_text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("text generation is disabled")]
    Disabled,
    #[error("text generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("text generation network failure: {0}")]
    Network(String),
    #[error("text generation rejected the credentials")]
    Authentication,
    #[error("text generation rate limited")]
    RateLimited,
    #[error("text generation service unavailable: {0}")]
    Unavailable(String),
    #[error("text generation returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// External reply generator. Every failure is recoverable for the caller.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Stand-in when no provider is configured; callers fall back to canned replies.
#[derive(Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}
