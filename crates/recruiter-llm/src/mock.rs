//! MockProvider - deterministic chat replies for tests and offline runs
//!
//! Each call to `complete` pops the next behavior; once the sequence is
//! exhausted the default behavior is used. Every request is recorded so
//! callers can inspect exactly which transcript was sent.

use crate::provider::{ChatProvider, LlmError, LlmResult};
use crate::types::{ChatRequest, ChatResponse};
use recruiter_core::Message;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock behavior configuration
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Reply with fixed text
    Text(String),
    /// Reply with the last user message prefixed by `echo: `
    Echo,
    /// Fail with `LlmError::RequestFailed`
    Error(String),
    /// Wait before replying with the given text
    Delayed { delay: Duration, text: String },
    /// Never reply
    Hang,
}

pub struct MockProvider {
    behaviors: Mutex<VecDeque<MockBehavior>>,
    default_behavior: MockBehavior,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    /// Create a mock that always returns the same behavior
    pub fn constant(behavior: MockBehavior) -> Self {
        Self {
            behaviors: Mutex::new(VecDeque::new()),
            default_behavior: behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with a sequence of behaviors (consumed in order)
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors.into()),
            default_behavior: MockBehavior::Text("(mock: sequence exhausted)".into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(reply: impl Into<String>) -> Self {
        Self::constant(MockBehavior::Text(reply.into()))
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All requests received so far, in call order.
    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_behavior(&self) -> MockBehavior {
        self.behaviors
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

#[async_trait::async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let last_user = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.requests.lock().await.push(request);

        let text = match self.next_behavior().await {
            MockBehavior::Text(text) => text,
            MockBehavior::Echo => format!("echo: {}", last_user),
            MockBehavior::Error(message) => return Err(LlmError::RequestFailed(message)),
            MockBehavior::Delayed { delay, text } => {
                tokio::time::sleep(delay).await;
                text
            }
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        Ok(ChatResponse {
            message: Message::assistant(text),
            finish_reason: Some("stop".into()),
            usage: None,
        })
    }
}
