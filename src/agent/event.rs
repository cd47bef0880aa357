//! Inputs to the transition function

use crate::dispatch::ToolResult;
use crate::llm::{LlmErrorKind, LlmResponse};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The user's question; only valid in `Init`
    Start { query: String },

    LlmResponse { response: LlmResponse },

    LlmFailed {
        kind: LlmErrorKind,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Backoff for `attempt` has elapsed
    RetryElapsed { attempt: u32 },

    /// Requested tool calls are about to run
    ToolCallsAccepted,

    ToolComplete { result: ToolResult },

    /// Deadline crossed at a checkpoint
    DeadlineExceeded,

    /// Cancellation observed at a checkpoint
    Cancelled,
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Start { .. } => "start",
            AgentEvent::LlmResponse { .. } => "llm_response",
            AgentEvent::LlmFailed { .. } => "llm_failed",
            AgentEvent::RetryElapsed { .. } => "retry_elapsed",
            AgentEvent::ToolCallsAccepted => "tool_calls_accepted",
            AgentEvent::ToolComplete { .. } => "tool_complete",
            AgentEvent::DeadlineExceeded => "deadline_exceeded",
            AgentEvent::Cancelled => "cancelled",
        }
    }
}
