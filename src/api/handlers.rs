//! HTTP request handlers

use super::sse::trace_stream;
use super::types::{
    AskRequest, BatchRequest, BatchResponse, ErrorResponse, HealthResponse, RunOptions,
    SessionResponse,
};
use super::AppState;
use crate::agent::{AgentLoop, RunReport};
use crate::events::ChannelSink;
use crate::session_log::SessionLogError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Buffered trace events per streaming client
const EVENT_BUFFER: usize = 64;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ask", post(ask))
        .route("/api/ask/sync", post(ask_sync))
        .route("/api/batch", post(batch))
        .route("/api/sessions/:id", get(get_session))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        provider: state.llm_registry.provider().as_str(),
        model: state.llm_registry.default_model_id().to_string(),
    })
}

/// Answer one question, streaming the trace as it happens.
///
/// The run stops (as cancelled) once the client goes away.
async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let agent = prepare(&state, &req.query, &req.options).await?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let sink = ChannelSink::new(tx, agent.cancel_token());
    let agent = agent.with_sink(Arc::new(sink));
    let query = req.query;

    tokio::spawn(async move {
        let report = agent.run(&query).await;
        tracing::info!(
            session_id = %report.session_id,
            outcome = report.outcome.as_str(),
            steps = report.steps,
            "Streaming run finished"
        );
    });

    Ok(trace_stream(rx))
}

/// Answer one question and return only the final report
async fn ask_sync(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<RunReport>, AppError> {
    let agent = prepare(&state, &req.query, &req.options).await?;
    Ok(Json(agent.run(&req.query).await))
}

/// Answer independent questions with bounded concurrency.
///
/// Every query is validated before any run starts; results keep input order.
async fn batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    if req.queries.is_empty() {
        return Err(AppError::BadRequest("queries must not be empty".to_string()));
    }

    let mut agents = Vec::with_capacity(req.queries.len());
    for query in &req.queries {
        agents.push(prepare(&state, query, &req.options).await?);
    }

    tracing::info!(
        queries = req.queries.len(),
        concurrency = state.batch_concurrency,
        "Starting batch"
    );

    let results = stream::iter(agents.into_iter().zip(req.queries))
        .map(|(agent, query)| async move { agent.run(&query).await })
        .buffered(state.batch_concurrency)
        .collect::<Vec<_>>()
        .await;

    Ok(Json(BatchResponse { results }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let Some(sessions) = &state.sessions else {
        return Err(AppError::NotFound(
            "session persistence is disabled".to_string(),
        ));
    };
    let events = sessions.read(&id).await?;
    Ok(Json(SessionResponse {
        session_id: id,
        events,
    }))
}

/// Validate a request and build its agent loop
async fn prepare(
    state: &AppState,
    query: &str,
    options: &RunOptions,
) -> Result<AgentLoop, AppError> {
    if query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".to_string()));
    }

    let llm = state
        .llm_registry
        .resolve(options.provider.as_deref(), options.model.as_deref())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut config = state.agent.clone();
    if let Some(max_steps) = options.max_steps {
        if max_steps == 0 {
            return Err(AppError::BadRequest(
                "max_steps must be at least 1".to_string(),
            ));
        }
        config.max_steps = max_steps;
    }
    if let Some(secs) = options.timeout_seconds {
        config.timeout = Duration::from_secs(secs);
    }

    let mut agent = AgentLoop::new(config, llm, state.dispatcher.clone());
    if let Some(sessions) = &state.sessions {
        match sessions.sink(agent.session_id()).await {
            Ok(sink) => agent = agent.with_sink(Arc::new(sink)),
            Err(e) => tracing::warn!(
                session_id = %agent.session_id(),
                error = %e,
                "Session trace will not be persisted"
            ),
        }
    }
    Ok(agent)
}

// Error handling

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<SessionLogError> for AppError {
    fn from(err: SessionLogError) -> Self {
        match &err {
            SessionLogError::InvalidId(_) => AppError::BadRequest(err.to_string()),
            SessionLogError::NotFound(_) => AppError::NotFound(err.to_string()),
            SessionLogError::Io(e) => {
                tracing::error!(error = %e, "Failed to read session trace");
                AppError::Internal("failed to read session trace".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
