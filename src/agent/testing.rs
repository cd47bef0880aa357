//! Test doubles and helpers for the agent loop

use super::runner::AgentLoop;
use super::AgentConfig;
use crate::dispatch::test_support::dispatcher;
use crate::events::{CollectingSink, TraceEvent};
use crate::llm::{ContentBlock, LlmError, LlmRequest, LlmResponse, LlmService, Usage};
use crate::tools::test_support::context;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Mock LLM that returns queued responses and records every request
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Returned once the queue is empty
    fallback: Option<LlmResponse>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new(responses: Vec<Result<LlmResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `response`
    pub fn always(response: LlmResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Err(LlmError::invalid_request("mock has no more responses")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

/// Mock LLM that answers only after `delay`
///
/// `request_started` is signalled as each request arrives, so tests can
/// cancel while a call is in flight.
pub struct DelayedMockLlm {
    response: LlmResponse,
    delay: Duration,
    pub request_started: Notify,
}

impl DelayedMockLlm {
    pub fn new(response: LlmResponse, delay: Duration) -> Self {
        Self {
            response,
            delay,
            request_started: Notify::new(),
        }
    }
}

#[async_trait]
impl LlmService for DelayedMockLlm {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }

    fn model_id(&self) -> &str {
        "delayed-mock-model"
    }
}

fn usage() -> Usage {
    Usage {
        input_tokens: 50,
        output_tokens: 5,
        ..Default::default()
    }
}

/// A plain answer
pub fn text(answer: &str) -> LlmResponse {
    LlmResponse {
        content: vec![ContentBlock::text(answer)],
        end_turn: true,
        usage: usage(),
        ..Default::default()
    }
}

/// A response requesting one tool call
pub fn tool_call(id: &str, name: &str, arguments: Value) -> LlmResponse {
    tools(&[(id, name, arguments)])
}

/// A response requesting several tool calls in order
pub fn tools(calls: &[(&str, &str, Value)]) -> LlmResponse {
    LlmResponse {
        content: calls
            .iter()
            .map(|(id, name, arguments)| ContentBlock::tool_use(*id, *name, arguments.clone()))
            .collect(),
        usage: usage(),
        ..Default::default()
    }
}

/// An agent over the test corpus, wired to a collecting sink
pub struct Harness {
    pub agent: AgentLoop,
    pub sink: Arc<CollectingSink>,
    _dir: TempDir,
}

pub fn harness(llm: Arc<dyn LlmService>, config: AgentConfig) -> Harness {
    let (dir, ctx) = context();
    let sink = Arc::new(CollectingSink::default());
    let agent = AgentLoop::new(config, llm, dispatcher(ctx, Duration::from_secs(5)))
        .with_sink(sink.clone());
    Harness {
        agent,
        sink,
        _dir: dir,
    }
}

pub trait TraceExt {
    fn types(&self) -> Vec<&'static str>;

    /// Gap-free sequence, `session` first, one `final` directly before
    /// exactly one terminal marker at the end
    fn assert_well_formed(&self);
}

impl TraceExt for [TraceEvent] {
    fn types(&self) -> Vec<&'static str> {
        self.iter().map(|e| e.kind.name()).collect()
    }

    fn assert_well_formed(&self) {
        for (i, event) in self.iter().enumerate() {
            assert_eq!(event.sequence, u64::try_from(i).unwrap(), "sequence gap at {i}");
        }
        let types = self.types();
        assert_eq!(types.first(), Some(&"session"));

        let terminals = self.iter().filter(|e| e.kind.is_terminal()).count();
        assert_eq!(terminals, 1, "expected one terminal marker in {types:?}");
        assert!(self.last().is_some_and(|e| e.kind.is_terminal()));

        assert_eq!(types.iter().filter(|t| **t == "final").count(), 1);
        assert_eq!(types.get(types.len().saturating_sub(2)), Some(&"final"));
    }
}
