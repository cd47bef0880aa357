//! Agent loop state types

use crate::dispatch::ToolCall;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    FinalAnswer,
    StepLimitExceeded,
    Timeout,
    Cancelled,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::FinalAnswer => "final_answer",
            Outcome::StepLimitExceeded => "step_limit_exceeded",
            Outcome::Timeout => "timeout",
            Outcome::Cancelled => "cancelled",
            Outcome::Error => "error",
        }
    }

    /// Terminal marker is `complete` rather than `error`
    pub fn completes(self) -> bool {
        matches!(self, Outcome::FinalAnswer | Outcome::StepLimitExceeded)
    }
}

/// Agent loop state
///
/// `steps_taken` counts completed LLM round trips. Failed attempts that are
/// retried do not count.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentState {
    Init,

    /// Waiting for the provider; `attempt` is 1-based within the step
    AwaitingLlm { steps_taken: usize, attempt: u32 },

    /// The model asked for tools; none started yet
    ToolCallRequested {
        steps_taken: usize,
        calls: Vec<ToolCall>,
    },

    /// One call in flight, the rest queued in order
    ExecutingTool {
        steps_taken: usize,
        current: ToolCall,
        remaining: Vec<ToolCall>,
    },

    FinalAnswer { steps_taken: usize },
    StepLimitExceeded { steps_taken: usize },
    Timeout { steps_taken: usize },
    Cancelled { steps_taken: usize },
    Error {
        steps_taken: usize,
        kind: ErrorKind,
        message: String,
    },
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            AgentState::FinalAnswer { .. } => Some(Outcome::FinalAnswer),
            AgentState::StepLimitExceeded { .. } => Some(Outcome::StepLimitExceeded),
            AgentState::Timeout { .. } => Some(Outcome::Timeout),
            AgentState::Cancelled { .. } => Some(Outcome::Cancelled),
            AgentState::Error { .. } => Some(Outcome::Error),
            AgentState::Init
            | AgentState::AwaitingLlm { .. }
            | AgentState::ToolCallRequested { .. }
            | AgentState::ExecutingTool { .. } => None,
        }
    }

    pub fn steps_taken(&self) -> usize {
        match self {
            AgentState::Init => 0,
            AgentState::AwaitingLlm { steps_taken, .. }
            | AgentState::ToolCallRequested { steps_taken, .. }
            | AgentState::ExecutingTool { steps_taken, .. }
            | AgentState::FinalAnswer { steps_taken }
            | AgentState::StepLimitExceeded { steps_taken }
            | AgentState::Timeout { steps_taken }
            | AgentState::Cancelled { steps_taken }
            | AgentState::Error { steps_taken, .. } => *steps_taken,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentState::Init => "init",
            AgentState::AwaitingLlm { .. } => "awaiting_llm",
            AgentState::ToolCallRequested { .. } => "tool_call_requested",
            AgentState::ExecutingTool { .. } => "executing_tool",
            AgentState::FinalAnswer { .. } => "final_answer",
            AgentState::StepLimitExceeded { .. } => "step_limit_exceeded",
            AgentState::Timeout { .. } => "timeout",
            AgentState::Cancelled { .. } => "cancelled",
            AgentState::Error { .. } => "error",
        }
    }
}

/// Immutable per-run parameters the transition function reads
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub max_steps: usize,
    pub max_llm_attempts: u32,
    pub retry_base: Duration,
}

impl AgentContext {
    pub fn new(session_id: impl Into<String>, max_steps: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_steps,
            max_llm_attempts: 3,
            retry_base: Duration::from_secs(1),
        }
    }
}
