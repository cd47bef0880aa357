//! Effects produced by state transitions

use super::state::Outcome;
use crate::dispatch::ToolCall;
use crate::events::EventKind;
use crate::llm::LlmMessage;
use std::time::Duration;

/// Content of the single `final` event
#[derive(Debug, Clone, PartialEq)]
pub enum FinalContent {
    /// The model's answer
    Text(String),
    /// Synthesize a digest from gathered tool results
    Partial,
}

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append to the conversation
    AppendMessage(LlmMessage),

    /// Issue one LLM call for the current conversation
    RequestLlm,

    /// Acknowledge a batch of tool calls so execution can start
    AcceptToolCalls,

    /// Run one tool call through the dispatcher
    ExecuteTool { call: ToolCall },

    /// Wait, then feed `RetryElapsed { attempt }`
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// Emit a trace event
    Emit(EventKind),

    /// Emit the final content and the terminal marker
    Finish {
        outcome: Outcome,
        content: FinalContent,
    },
}

impl Effect {
    pub fn finish_partial(outcome: Outcome) -> Self {
        Effect::Finish {
            outcome,
            content: FinalContent::Partial,
        }
    }
}
