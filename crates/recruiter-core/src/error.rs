//! Error types for the recruiter service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load {table} table from {path}: {message}")]
    DataLoad {
        table: String,
        path: String,
        message: String,
    },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("dossier unavailable for posting {posting_id} / candidate {candidate_id}: {reason}")]
    InconsistentDossier {
        posting_id: String,
        candidate_id: String,
        reason: String,
    },

    #[error("invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("session capacity reached ({capacity} sessions)")]
    SessionCapacity { capacity: usize },

    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("llm timeout: {provider} gave no reply within {timeout_ms}ms")]
    LlmTimeout { provider: String, timeout_ms: u64 },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn data_load(
        table: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DataLoad {
            table: table.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Errors the caller can do nothing about but wait; mapped to 503 by the gateway.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::SessionCapacity { .. })
    }
}
