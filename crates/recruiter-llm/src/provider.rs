//! Chat provider trait

use crate::types::{ChatRequest, ChatResponse};

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl LlmError {
    /// Lift into the service error, tagging it with the provider that failed.
    pub fn into_service_error(self, provider: &str) -> recruiter_core::Error {
        match self {
            LlmError::Timeout { timeout_ms } => recruiter_core::Error::LlmTimeout {
                provider: provider.to_string(),
                timeout_ms,
            },
            other => recruiter_core::Error::llm_error(provider, other.to_string()),
        }
    }
}

/// A hosted chat-completion capability.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run one completion over the full transcript in `request`.
    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse>;
}
