//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same new
//! state and effects. All I/O happens in the runner.

use super::effect::{Effect, FinalContent};
use super::event::AgentEvent;
use super::state::{AgentContext, AgentState, Outcome};
use crate::dispatch::{ToolCall, ToolResult};
use crate::error::ErrorKind;
use crate::events::EventKind;
use crate::llm::{ContentBlock, LlmError, LlmErrorKind, LlmMessage, LlmResponse};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: AgentState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: AgentState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Run already finished in state {0}")]
    AlreadyFinished(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(
    state: &AgentState,
    ctx: &AgentContext,
    event: AgentEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (s, _) if s.is_terminal() => Err(TransitionError::AlreadyFinished(s.name())),

        // Checkpoint outcomes, valid from every live state
        (s, AgentEvent::Cancelled) => Ok(TransitionResult::new(AgentState::Cancelled {
            steps_taken: s.steps_taken(),
        })
        .with_effect(Effect::finish_partial(Outcome::Cancelled))),

        (s, AgentEvent::DeadlineExceeded) => Ok(TransitionResult::new(AgentState::Timeout {
            steps_taken: s.steps_taken(),
        })
        .with_effect(Effect::finish_partial(Outcome::Timeout))),

        (AgentState::Init, AgentEvent::Start { query }) => Ok(TransitionResult::new(
            AgentState::AwaitingLlm {
                steps_taken: 0,
                attempt: 1,
            },
        )
        .with_effect(Effect::AppendMessage(LlmMessage::user(vec![
            ContentBlock::text(format!("Question: {query}")),
        ])))
        .with_effect(Effect::Emit(EventKind::StepStarted { step: 1 }))
        .with_effect(Effect::RequestLlm)),

        (
            AgentState::AwaitingLlm {
                steps_taken,
                attempt,
            },
            AgentEvent::LlmResponse { response },
        ) => {
            if response.is_empty() {
                let empty = LlmError::empty_response();
                return Ok(on_llm_failure(
                    ctx,
                    *steps_taken,
                    *attempt,
                    empty.kind,
                    empty.message,
                    None,
                ));
            }
            Ok(on_llm_response(*steps_taken, response))
        }

        (
            AgentState::AwaitingLlm {
                steps_taken,
                attempt,
            },
            AgentEvent::LlmFailed {
                kind,
                message,
                retry_after,
            },
        ) => Ok(on_llm_failure(
            ctx,
            *steps_taken,
            *attempt,
            kind,
            message,
            retry_after,
        )),

        (AgentState::AwaitingLlm { attempt, .. }, AgentEvent::RetryElapsed { attempt: elapsed })
            if elapsed == *attempt =>
        {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::RequestLlm))
        }

        (AgentState::ToolCallRequested { steps_taken, calls }, AgentEvent::ToolCallsAccepted) => {
            match calls.split_first() {
                Some((first, rest)) => Ok(start_tool(*steps_taken, first.clone(), rest.to_vec())),
                None => Err(TransitionError::InvalidTransition(
                    "tool call batch is empty".to_string(),
                )),
            }
        }

        (
            AgentState::ExecutingTool {
                steps_taken,
                current,
                remaining,
            },
            AgentEvent::ToolComplete { result },
        ) if result.tool_call_id == current.id => {
            Ok(on_tool_complete(ctx, *steps_taken, current, remaining, &result))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{} in state {}",
            event.name(),
            state.name()
        ))),
    }
}

fn on_llm_response(steps_taken: usize, response: LlmResponse) -> TransitionResult {
    let step = steps_taken + 1;
    let mut effects = vec![Effect::Emit(EventKind::TokenUsage {
        step,
        usage: response.usage,
    })];
    if let Some(reasoning) = response.reasoning.as_deref().map(str::trim) {
        if !reasoning.is_empty() {
            effects.push(Effect::Emit(EventKind::Reasoning {
                step,
                text: reasoning.to_string(),
            }));
        }
    }

    let text = response.text();
    let (content, calls) = normalize_tool_ids(step, response.content);

    if calls.is_empty() {
        return TransitionResult::new(AgentState::FinalAnswer { steps_taken: step })
            .with_effects(effects)
            .with_effect(Effect::AppendMessage(LlmMessage::assistant(content)))
            .with_effect(Effect::Finish {
                outcome: Outcome::FinalAnswer,
                content: FinalContent::Text(text.trim().to_string()),
            });
    }

    // Text alongside tool calls is interim reasoning, not an answer
    if !text.trim().is_empty() {
        effects.push(Effect::Emit(EventKind::Reasoning {
            step,
            text: text.trim().to_string(),
        }));
    }
    TransitionResult::new(AgentState::ToolCallRequested {
        steps_taken: step,
        calls,
    })
    .with_effects(effects)
    .with_effect(Effect::AppendMessage(LlmMessage::assistant(content)))
    .with_effect(Effect::AcceptToolCalls)
}

fn on_llm_failure(
    ctx: &AgentContext,
    steps_taken: usize,
    attempt: u32,
    kind: LlmErrorKind,
    message: String,
    retry_after: Option<Duration>,
) -> TransitionResult {
    if kind.is_retryable() && attempt < ctx.max_llm_attempts {
        let delay = retry_after.unwrap_or_else(|| backoff(ctx.retry_base, attempt));
        let next = attempt + 1;
        return TransitionResult::new(AgentState::AwaitingLlm {
            steps_taken,
            attempt: next,
        })
        .with_effect(Effect::Emit(EventKind::Retry {
            step: steps_taken + 1,
            attempt: next,
            kind: kind.as_str().to_string(),
            message,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }))
        .with_effect(Effect::ScheduleRetry {
            delay,
            attempt: next,
        });
    }

    TransitionResult::new(AgentState::Error {
        steps_taken,
        kind: ErrorKind::ProviderError,
        message: format!("{} after {attempt} attempt(s): {message}", kind.as_str()),
    })
    .with_effect(Effect::finish_partial(Outcome::Error))
}

fn start_tool(steps_taken: usize, call: ToolCall, remaining: Vec<ToolCall>) -> TransitionResult {
    let started = EventKind::ToolCallStarted {
        step: steps_taken,
        id: call.id.clone(),
        name: call.name.clone(),
        arguments: call.arguments.clone(),
    };
    TransitionResult::new(AgentState::ExecutingTool {
        steps_taken,
        current: call.clone(),
        remaining,
    })
    .with_effect(Effect::Emit(started))
    .with_effect(Effect::ExecuteTool { call })
}

fn on_tool_complete(
    ctx: &AgentContext,
    steps_taken: usize,
    current: &ToolCall,
    remaining: &[ToolCall],
    result: &ToolResult,
) -> TransitionResult {
    let effects = [
        Effect::AppendMessage(LlmMessage::user(vec![ContentBlock::tool_result(
            &result.tool_call_id,
            &result.content,
            result.is_error,
        )])),
        Effect::Emit(EventKind::ToolCallCompleted {
            step: steps_taken,
            id: current.id.clone(),
            name: current.name.clone(),
            is_error: result.is_error,
            summary: result.summary(),
        }),
    ];

    if let Some((next, rest)) = remaining.split_first() {
        let started = start_tool(steps_taken, next.clone(), rest.to_vec());
        return TransitionResult::new(started.new_state)
            .with_effects(effects)
            .with_effects(started.effects);
    }

    if steps_taken >= ctx.max_steps {
        return TransitionResult::new(AgentState::StepLimitExceeded { steps_taken })
            .with_effects(effects)
            .with_effect(Effect::finish_partial(Outcome::StepLimitExceeded));
    }

    TransitionResult::new(AgentState::AwaitingLlm {
        steps_taken,
        attempt: 1,
    })
    .with_effects(effects)
    .with_effect(Effect::Emit(EventKind::StepStarted {
        step: steps_taken + 1,
    }))
    .with_effect(Effect::RequestLlm)
}

/// Exponential backoff: `base`, `2 * base`, `4 * base`, ...
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(16))
}

/// Replace empty or repeated tool-call ids with `call_<step>_<index>`.
///
/// Returns the rewritten content together with the calls in order.
fn normalize_tool_ids(step: usize, content: Vec<ContentBlock>) -> (Vec<ContentBlock>, Vec<ToolCall>) {
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    let mut blocks = Vec::with_capacity(content.len());

    for block in content {
        let (id, name, input) = match block {
            ContentBlock::ToolUse { id, name, input } => (id, name, input),
            other => {
                blocks.push(other);
                continue;
            }
        };
        let index = calls.len();
        let mut id = id.trim().to_string();
        if id.is_empty() || seen.contains(&id) {
            id = format!("call_{step}_{index}");
            let mut suffix = 1;
            while seen.contains(&id) {
                id = format!("call_{step}_{index}_{suffix}");
                suffix += 1;
            }
        }
        seen.insert(id.clone());
        calls.push(ToolCall::new(id.clone(), name.clone(), input.clone()));
        blocks.push(ContentBlock::ToolUse { id, name, input });
    }
    (blocks, calls)
}
