//! Property-based tests for the agent transition function
//!
//! Random event sequences are driven from `Init`; tool results are matched to
//! the call in flight so runs reach deep states instead of stalling.

use super::effect::Effect;
use super::event::AgentEvent;
use super::state::{AgentContext, AgentState};
use super::transition::{transition, TransitionError};
use crate::dispatch::{ToolCall, ToolResult};
use crate::llm::{ContentBlock, LlmErrorKind, LlmResponse};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// Abstract input, made concrete against the current state
#[derive(Debug, Clone)]
enum Input {
    Start,
    Answer,
    RequestTools(usize),
    Fail(LlmErrorKind),
    RetryElapsed,
    Accept,
    CompleteTool { is_error: bool },
    Deadline,
    Cancel,
}

fn arb_llm_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::Auth),
        Just(LlmErrorKind::InvalidRequest),
        Just(LlmErrorKind::Unknown),
    ]
}

fn arb_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        1 => Just(Input::Start),
        2 => Just(Input::Answer),
        6 => (1usize..4).prop_map(Input::RequestTools),
        2 => arb_llm_error_kind().prop_map(Input::Fail),
        2 => Just(Input::RetryElapsed),
        4 => Just(Input::Accept),
        8 => any::<bool>().prop_map(|is_error| Input::CompleteTool { is_error }),
        1 => Just(Input::Deadline),
        1 => Just(Input::Cancel),
    ]
}

fn arb_terminal_state() -> impl Strategy<Value = AgentState> {
    (0usize..10).prop_flat_map(|steps_taken| {
        prop_oneof![
            Just(AgentState::FinalAnswer { steps_taken }),
            Just(AgentState::StepLimitExceeded { steps_taken }),
            Just(AgentState::Timeout { steps_taken }),
            Just(AgentState::Cancelled { steps_taken }),
            Just(AgentState::Error {
                steps_taken,
                kind: crate::error::ErrorKind::ProviderError,
                message: "boom".to_string(),
            }),
        ]
    })
}

fn concrete(input: &Input, state: &AgentState) -> AgentEvent {
    match input {
        Input::Start => AgentEvent::Start {
            query: "Kündigungsfrist".to_string(),
        },
        Input::Answer => AgentEvent::LlmResponse {
            response: LlmResponse {
                content: vec![ContentBlock::text("Antwort")],
                ..Default::default()
            },
        },
        Input::RequestTools(n) => AgentEvent::LlmResponse {
            response: LlmResponse {
                content: (0..*n)
                    .map(|i| ContentBlock::tool_use(format!("t{i}"), "list_paths", json!({})))
                    .collect(),
                ..Default::default()
            },
        },
        Input::Fail(kind) => AgentEvent::LlmFailed {
            kind: *kind,
            message: "failure".to_string(),
            retry_after: Some(Duration::from_millis(1)),
        },
        Input::RetryElapsed => AgentEvent::RetryElapsed {
            attempt: match state {
                AgentState::AwaitingLlm { attempt, .. } => *attempt,
                _ => 1,
            },
        },
        Input::Accept => AgentEvent::ToolCallsAccepted,
        Input::CompleteTool { is_error } => {
            let id = match state {
                AgentState::ExecutingTool { current, .. } => current.id.clone(),
                _ => "unmatched".to_string(),
            };
            AgentEvent::ToolComplete {
                result: ToolResult {
                    tool_call_id: id,
                    content: "{}".to_string(),
                    is_error: *is_error,
                },
            }
        }
        Input::Deadline => AgentEvent::DeadlineExceeded,
        Input::Cancel => AgentEvent::Cancelled,
    }
}

fn finishes(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Finish { .. }))
        .count()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_terminal_states_absorb(state in arb_terminal_state(), input in arb_input()) {
        let ctx = AgentContext::new("prop", 5);
        let event = concrete(&input, &state);
        let result = transition(&state, &ctx, event);
        prop_assert!(matches!(result, Err(TransitionError::AlreadyFinished(_))));
    }

    #[test]
    fn prop_steps_bounded_and_monotonic(
        max_steps in 1usize..6,
        inputs in prop::collection::vec(arb_input(), 1..80),
    ) {
        let ctx = AgentContext::new("prop", max_steps);
        let mut state = AgentState::Init;
        let mut finish_count = 0;

        for input in &inputs {
            let before = state.steps_taken();
            let was_terminal = state.is_terminal();
            let event = concrete(input, &state);

            if let Ok(result) = transition(&state, &ctx, event) {
                prop_assert!(!was_terminal);
                let after = result.new_state.steps_taken();
                prop_assert!(after >= before, "steps went backwards: {before} -> {after}");
                prop_assert!(after <= before + 1);
                prop_assert!(after <= max_steps, "steps {after} exceed max {max_steps}");

                let finished = finishes(&result.effects);
                prop_assert_eq!(finished > 0, result.new_state.is_terminal());
                finish_count += finished;
                state = result.new_state;
            }
        }

        prop_assert!(finish_count <= 1);
        prop_assert_eq!(finish_count == 1, state.is_terminal());
    }

    #[test]
    fn prop_executing_tool_ids_unique_per_step(n in 1usize..6, dup in any::<bool>()) {
        let ctx = AgentContext::new("prop", 5);
        let content = (0..n)
            .map(|i| {
                let id = if dup { "same".to_string() } else { format!("id{i}") };
                ContentBlock::tool_use(id, "list_paths", json!({}))
            })
            .collect();
        let state = AgentState::AwaitingLlm { steps_taken: 0, attempt: 1 };
        let result = transition(
            &state,
            &ctx,
            AgentEvent::LlmResponse { response: LlmResponse { content, ..Default::default() } },
        )
        .unwrap();

        let AgentState::ToolCallRequested { calls, .. } = result.new_state else {
            panic!("expected ToolCallRequested");
        };
        let mut ids: Vec<&str> = calls.iter().map(|c: &ToolCall| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), n);
    }
}
