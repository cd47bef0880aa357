//! Effect-executing agent loop
//!
//! Feeds events through [`transition`] and performs the resulting effects.
//! Exactly one LLM call or tool call is in flight at a time. Cancellation and
//! the deadline are checked right before each of them and observed while
//! they are pending; a pending call is then detached and its result dropped.

use super::conversation::Conversation;
use super::effect::{Effect, FinalContent};
use super::event::AgentEvent;
use super::state::{AgentContext, AgentState, Outcome};
use super::synthesis::synthesize;
use super::transition::transition;
use super::AgentConfig;
use crate::dispatch::{DispatchError, Dispatcher, ToolCall, ToolResult};
use crate::error::ErrorKind;
use crate::events::{EventEmitter, EventKind, EventSink};
use crate::llm::{LlmErrorKind, LlmRequest, LlmService, SystemContent, Usage};
use crate::system_prompt::build_system_prompt;
use rand::Rng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub outcome: Outcome,
    pub answer: String,
    /// `answer` is an evidence digest rather than a model answer
    pub partial: bool,
    pub steps: usize,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// One question, one conversation, one trace
pub struct AgentLoop {
    config: AgentConfig,
    llm: Arc<dyn LlmService>,
    dispatcher: Dispatcher,
    session_id: String,
    cancel: CancellationToken,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl AgentLoop {
    pub fn new(config: AgentConfig, llm: Arc<dyn LlmService>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            llm,
            dispatcher,
            session_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the loop to a terminal state.
    ///
    /// Never fails: every way a run can end is reported through the trace and
    /// the returned [`RunReport`].
    pub async fn run(self, query: &str) -> RunReport {
        // A deadline beyond what Instant can represent is no deadline
        let start = Instant::now();
        let deadline = start
            .checked_add(self.config.timeout)
            .unwrap_or_else(|| start + Duration::from_secs(365 * 24 * 3600));

        let system_prompt = build_system_prompt(&self.dispatcher.definitions());
        let mut run = Run {
            ctx: AgentContext {
                max_llm_attempts: self.config.max_llm_attempts.max(1),
                retry_base: self.config.retry_base,
                ..AgentContext::new(self.session_id.clone(), self.config.max_steps)
            },
            state: AgentState::Init,
            conversation: Conversation::new(),
            emitter: EventEmitter::new(self.sinks),
            usage: Usage::default(),
            deadline,
            timeout: self.config.timeout,
            max_tokens: self.config.max_tokens,
            system_prompt,
            llm: self.llm,
            dispatcher: self.dispatcher,
            cancel: self.cancel,
            answer: String::new(),
            partial: false,
        };

        tracing::info!(
            session_id = %run.ctx.session_id,
            max_steps = run.ctx.max_steps,
            timeout_ms = u64::try_from(run.timeout.as_millis()).unwrap_or(u64::MAX),
            model = %run.llm.model_id(),
            "Agent run started"
        );
        run.emitter
            .emit(EventKind::Session {
                session_id: run.ctx.session_id.clone(),
                query: query.to_string(),
                model: run.llm.model_id().to_string(),
            })
            .await;

        run.drive(AgentEvent::Start {
            query: query.to_string(),
        })
        .await;

        let report = run.report();
        tracing::info!(
            session_id = %report.session_id,
            outcome = report.outcome.as_str(),
            steps = report.steps,
            input_tokens = report.usage.input_tokens,
            output_tokens = report.usage.output_tokens,
            total_tokens = report.usage.total(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Agent run finished"
        );
        report
    }
}

/// Mutable state of one run
struct Run {
    ctx: AgentContext,
    state: AgentState,
    conversation: Conversation,
    emitter: EventEmitter,
    usage: Usage,
    deadline: Instant,
    timeout: Duration,
    max_tokens: Option<u32>,
    system_prompt: String,
    llm: Arc<dyn LlmService>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    answer: String,
    partial: bool,
}

impl Run {
    async fn drive(&mut self, first: AgentEvent) {
        let mut queue = VecDeque::from([first]);

        while let Some(event) = queue.pop_front() {
            let event_name = event.name();
            let result = match transition(&self.state, &self.ctx, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        session_id = %self.ctx.session_id,
                        state = self.state.name(),
                        event = event_name,
                        error = %e,
                        "Agent transition failed"
                    );
                    if self.state.is_terminal() {
                        continue;
                    }
                    self.state = AgentState::Error {
                        steps_taken: self.state.steps_taken(),
                        kind: ErrorKind::ProviderError,
                        message: e.to_string(),
                    };
                    self.finish(Outcome::Error, FinalContent::Partial).await;
                    break;
                }
            };

            tracing::debug!(
                session_id = %self.ctx.session_id,
                from = self.state.name(),
                to = result.new_state.name(),
                event = event_name,
                "Agent transition"
            );
            self.state = result.new_state;

            for effect in result.effects {
                if let Some(next) = self.execute(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<AgentEvent> {
        match effect {
            Effect::AppendMessage(message) => {
                self.conversation.push(message);
                None
            }
            Effect::Emit(kind) => {
                self.emitter.emit(kind).await;
                None
            }
            Effect::RequestLlm => Some(match self.checkpoint() {
                Some(stop) => stop,
                None => self.request_llm().await,
            }),
            Effect::AcceptToolCalls => Some(AgentEvent::ToolCallsAccepted),
            Effect::ExecuteTool { call } => Some(match self.checkpoint() {
                Some(stop) => stop,
                None => self.execute_tool(call).await,
            }),
            Effect::ScheduleRetry { delay, attempt } => Some(self.wait_retry(delay, attempt).await),
            Effect::Finish { outcome, content } => {
                self.finish(outcome, content).await;
                None
            }
        }
    }

    /// Cancellation wins over the deadline when both apply
    fn checkpoint(&self) -> Option<AgentEvent> {
        if self.cancel.is_cancelled() {
            Some(AgentEvent::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(AgentEvent::DeadlineExceeded)
        } else {
            None
        }
    }

    async fn request_llm(&mut self) -> AgentEvent {
        let request = LlmRequest {
            system: vec![SystemContent::cached(self.system_prompt.clone())],
            messages: self.conversation.messages().to_vec(),
            tools: self.dispatcher.definitions(),
            tool_choice: self.conversation.tool_choice(),
            max_tokens: self.max_tokens,
        };

        let (step, attempt) = match self.state {
            AgentState::AwaitingLlm {
                steps_taken,
                attempt,
            } => (steps_taken + 1, attempt),
            _ => (0, 0),
        };
        let started = Instant::now();

        let llm = self.llm.clone();
        let mut handle = tokio::spawn(async move { llm.complete(&request).await });

        let joined = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                tracing::info!(session_id = %self.ctx.session_id, "LLM request discarded after cancellation");
                return AgentEvent::Cancelled;
            }

            () = tokio::time::sleep_until(self.deadline) => {
                tracing::info!(session_id = %self.ctx.session_id, "LLM request discarded after deadline");
                return AgentEvent::DeadlineExceeded;
            }

            joined = &mut handle => joined,
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match joined {
            Ok(Ok(response)) => {
                let tool_calls = response.tool_uses().len();
                tracing::info!(
                    session_id = %self.ctx.session_id,
                    model = %self.llm.model_id(),
                    step,
                    attempt,
                    duration_ms,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls,
                    "LLM request completed"
                );
                if tool_calls == 0 && !response.end_turn {
                    tracing::warn!(
                        session_id = %self.ctx.session_id,
                        step,
                        "LLM stopped before ending its turn, answer may be truncated"
                    );
                }
                self.usage += response.usage;
                AgentEvent::LlmResponse { response }
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    session_id = %self.ctx.session_id,
                    model = %self.llm.model_id(),
                    step,
                    attempt,
                    duration_ms,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    will_retry = e.kind.is_retryable() && attempt < self.ctx.max_llm_attempts,
                    error = %e.message,
                    "LLM request failed"
                );
                AgentEvent::LlmFailed {
                    kind: e.kind,
                    message: e.message,
                    retry_after: e.retry_after,
                }
            }
            Err(join_error) => AgentEvent::LlmFailed {
                kind: LlmErrorKind::Unknown,
                message: format!("LLM task failed: {join_error}"),
                retry_after: None,
            },
        }
    }

    async fn execute_tool(&self, call: ToolCall) -> AgentEvent {
        let dispatcher = self.dispatcher.clone();
        let id = call.id.clone();
        let name = call.name.clone();
        let mut handle = tokio::spawn(async move { dispatcher.dispatch(&call).await });

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                tracing::info!(session_id = %self.ctx.session_id, tool = %name, "Tool result discarded after cancellation");
                AgentEvent::Cancelled
            }

            () = tokio::time::sleep_until(self.deadline) => {
                tracing::info!(session_id = %self.ctx.session_id, tool = %name, "Tool result discarded after deadline");
                AgentEvent::DeadlineExceeded
            }

            joined = &mut handle => {
                let result = joined.unwrap_or_else(|join_error| {
                    ToolResult::error(
                        &id,
                        &DispatchError::Panicked {
                            tool: name.clone(),
                            message: join_error.to_string(),
                        },
                    )
                });
                AgentEvent::ToolComplete { result }
            }
        }
    }

    async fn wait_retry(&self, delay: Duration, attempt: u32) -> AgentEvent {
        let jitter_cap = u64::try_from(delay.as_millis() / 4).unwrap_or(0);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_cap));
        tracing::warn!(
            session_id = %self.ctx.session_id,
            attempt,
            delay_ms = u64::try_from((delay + jitter).as_millis()).unwrap_or(u64::MAX),
            "Retrying LLM request"
        );

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => AgentEvent::Cancelled,
            () = tokio::time::sleep_until(self.deadline) => AgentEvent::DeadlineExceeded,
            () = tokio::time::sleep(delay + jitter) => AgentEvent::RetryElapsed { attempt },
        }
    }

    /// Emit the single `final` event and the terminal marker
    async fn finish(&mut self, outcome: Outcome, content: FinalContent) {
        let (answer, partial) = match content {
            FinalContent::Text(text) => (text, false),
            FinalContent::Partial => (synthesize(outcome, &self.conversation.evidence()), true),
        };
        self.answer.clone_from(&answer);
        self.partial = partial;

        self.emitter
            .emit(EventKind::Final {
                outcome,
                content: answer,
                partial,
            })
            .await;

        let marker = match self.failure() {
            Some(failure) if !outcome.completes() => EventKind::Error {
                kind: failure.kind,
                message: failure.message,
            },
            _ => EventKind::Complete {
                outcome,
                steps: self.state.steps_taken(),
                usage: self.usage,
            },
        };
        self.emitter.emit(marker).await;
    }

    fn failure(&self) -> Option<RunFailure> {
        let (kind, message) = match &self.state {
            AgentState::Timeout { .. } => (
                ErrorKind::Timeout,
                format!("deadline of {}s exceeded", self.timeout.as_secs_f64()),
            ),
            AgentState::Cancelled { .. } => (ErrorKind::Cancelled, "run cancelled".to_string()),
            AgentState::Error { kind, message, .. } => (*kind, message.clone()),
            _ => return None,
        };
        Some(RunFailure { kind, message })
    }

    fn report(self) -> RunReport {
        let outcome = self.state.outcome().unwrap_or(Outcome::Error);
        RunReport {
            error: self.failure(),
            session_id: self.ctx.session_id,
            outcome,
            answer: self.answer,
            partial: self.partial,
            steps: self.state.steps_taken(),
            usage: self.usage,
        }
    }
}
