//! Ordered trace events
//!
//! Every run produces one stream of [`TraceEvent`]s. Sequence numbers start at
//! zero and increase by one per event; the stream ends with exactly one
//! `complete` or `error` marker, after which the emitter drops anything else.

use crate::agent::Outcome;
use crate::error::ErrorKind;
use crate::llm::Usage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Payload of a trace event, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Session {
        session_id: String,
        query: String,
        model: String,
    },
    StepStarted {
        step: usize,
    },
    Reasoning {
        step: usize,
        text: String,
    },
    TokenUsage {
        step: usize,
        #[serde(flatten)]
        usage: Usage,
    },
    Retry {
        step: usize,
        attempt: u32,
        kind: String,
        message: String,
        delay_ms: u64,
    },
    ToolCallStarted {
        step: usize,
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallCompleted {
        step: usize,
        id: String,
        name: String,
        is_error: bool,
        summary: String,
    },
    Final {
        outcome: Outcome,
        content: String,
        /// True when `content` is a digest of gathered evidence, not a model answer
        partial: bool,
    },
    Complete {
        outcome: Outcome,
        steps: usize,
        usage: Usage,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl EventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Complete { .. } | EventKind::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Session { .. } => "session",
            EventKind::StepStarted { .. } => "step_started",
            EventKind::Reasoning { .. } => "reasoning",
            EventKind::TokenUsage { .. } => "token_usage",
            EventKind::Retry { .. } => "retry",
            EventKind::ToolCallStarted { .. } => "tool_call_started",
            EventKind::ToolCallCompleted { .. } => "tool_call_completed",
            EventKind::Final { .. } => "final",
            EventKind::Complete { .. } => "complete",
            EventKind::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Encode one event as a server-sent-events frame
pub fn frame(event: &TraceEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// Destination for trace events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &TraceEvent);
}

/// Numbers events and fans them out to every sink
pub struct EventEmitter {
    next_sequence: u64,
    closed: bool,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventEmitter {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            next_sequence: 0,
            closed: false,
            sinks,
        }
    }

    /// Emit an event; returns `None` once the terminal marker went out.
    pub async fn emit(&mut self, kind: EventKind) -> Option<TraceEvent> {
        if self.closed {
            tracing::warn!(event = kind.name(), "Dropping event emitted after terminal marker");
            return None;
        }
        let event = TraceEvent {
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            kind,
        };
        self.next_sequence += 1;
        self.closed = event.kind.is_terminal();

        for sink in &self.sinks {
            sink.send(&event).await;
        }
        Some(event)
    }
}

/// Forwards events to a channel; a dropped receiver cancels the run.
pub struct ChannelSink {
    tx: mpsc::Sender<TraceEvent>,
    cancel: CancellationToken,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TraceEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, event: &TraceEvent) {
        if self.tx.send(event.clone()).await.is_err() && !self.cancel.is_cancelled() {
            tracing::info!("Event receiver dropped, cancelling run");
            self.cancel.cancel();
        }
    }
}

/// Keeps every event in memory
#[cfg(test)]
#[derive(Default)]
pub struct CollectingSink {
    events: std::sync::Mutex<Vec<TraceEvent>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl EventSink for CollectingSink {
    async fn send(&self, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
