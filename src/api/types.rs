//! API request and response types

use crate::agent::RunReport;
use crate::events::TraceEvent;
use serde::{Deserialize, Serialize};

/// Per-request overrides of the server defaults
#[derive(Debug, Default, Deserialize)]
pub struct RunOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_steps: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

/// Request to answer one question
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(flatten)]
    pub options: RunOptions,
}

/// Request to answer several independent questions
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub queries: Vec<String>,
    #[serde(flatten)]
    pub options: RunOptions,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub provider: &'static str,
    pub model: String,
}

/// Batch results, in the order the queries were given
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<RunReport>,
}

/// A persisted session trace
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub events: Vec<TraceEvent>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
