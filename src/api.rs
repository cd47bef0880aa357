//! HTTP API
//!
//! Streaming and synchronous question answering, batch runs, and retrieval
//! of persisted session traces.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::agent::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::llm::ModelRegistry;
use crate::session_log::SessionLog;
use std::sync::Arc;

/// Application state shared across handlers
///
/// Everything here is read-only; each request builds its own agent loop.
#[derive(Clone)]
pub struct AppState {
    pub llm_registry: Arc<ModelRegistry>,
    pub dispatcher: Dispatcher,
    pub agent: AgentConfig,
    /// `None` when trace persistence is disabled
    pub sessions: Option<SessionLog>,
    pub batch_concurrency: usize,
}

impl AppState {
    pub fn new(
        llm_registry: Arc<ModelRegistry>,
        dispatcher: Dispatcher,
        agent: AgentConfig,
        sessions: Option<SessionLog>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            llm_registry,
            dispatcher,
            agent,
            sessions,
            batch_concurrency: batch_concurrency.max(1),
        }
    }
}
