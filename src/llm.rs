//! Chat model backends
//!
//! The agent loop only sees [`LlmService`]: one request carrying the system
//! prompt, the conversation so far and the tool schemas, one response carrying
//! text and tool calls. Anthropic and OpenAI-compatible endpoints translate
//! that shape to their own wire formats.

mod anthropic;
mod error;
mod openai;
mod registry;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;

/// A chat model that can answer with text or request tool calls
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Send one turn of the conversation. Errors carry a kind the loop uses
    /// to decide whether to retry.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Model name reported in the session event
    fn model_id(&self) -> &str;
}
