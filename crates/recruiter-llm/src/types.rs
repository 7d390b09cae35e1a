//! LLM types for chat-completion requests and responses

use recruiter_core::{LlmConfig, Message};
use serde::{Deserialize, Serialize};

/// Chat-completion request: the whole transcript is sent every turn.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl From<&LlmConfig> for ChatRequest {
    /// An empty transcript carrying the configured model parameters.
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            messages: Vec::new(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

/// Chat-completion result
#[derive(Clone, Debug)]
pub struct ChatResponse {
    /// Always an assistant-role message.
    pub message: Message,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}
