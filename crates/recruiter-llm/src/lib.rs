//! Recruiter LLM - Chat-completion provider adapters

pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod types;

pub use mock::{MockBehavior, MockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ChatProvider, LlmError, LlmResult};
pub use types::*;
