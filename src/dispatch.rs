//! Tool dispatcher
//!
//! Turns a model-issued [`ToolCall`] into a [`ToolResult`]. Nothing raised
//! below this point escapes: unknown tools, malformed arguments, tool errors,
//! timeouts and panics all become `is_error` results the model can read and
//! react to. The dispatcher holds no per-call state and may be shared freely.

use crate::error::ErrorKind;
use crate::tools::{ParamSpec, ToolArgs, ToolContext, ToolError, ToolRegistry};
use crate::llm::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::error::Error as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool call, success or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, value: &Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: value.to_string(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, err: &DispatchError) -> Self {
        let mut body = json!({
            "kind": err.kind(),
            "message": err.to_string(),
        });
        if let Some(cause) = err.root_cause() {
            body["cause"] = json!(cause);
        }
        Self {
            tool_call_id: tool_call_id.into(),
            content: json!({ "error": body }).to_string(),
            is_error: true,
        }
    }

    /// Error kind carried in an error envelope
    #[cfg(test)]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        if !self.is_error {
            return None;
        }
        let value: Value = serde_json::from_str(&self.content).ok()?;
        serde_json::from_value(value.pointer("/error/kind")?.clone()).ok()
    }

    /// One-line description for trace events
    pub fn summary(&self) -> String {
        let Ok(value) = serde_json::from_str::<Value>(&self.content) else {
            return truncate(&self.content, SUMMARY_CHARS);
        };
        if self.is_error {
            let kind = value.pointer("/error/kind").and_then(Value::as_str).unwrap_or("error");
            let message = value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return truncate(&format!("{kind}: {message}"), SUMMARY_CHARS);
        }

        let count = |key: &str| value.get(key).and_then(Value::as_array).map(Vec::len);
        if let Some(n) = count("matches") {
            format!("{n} matches")
        } else if let Some(n) = count("paths") {
            format!("{n} paths")
        } else if let Some(n) = count("hits") {
            format!("{n} index hits")
        } else if let Some(path) = value.get("path").and_then(Value::as_str) {
            let start = value.get("start_line").and_then(Value::as_u64).unwrap_or(0);
            let end = value.get("end_line").and_then(Value::as_u64).unwrap_or(0);
            format!("read {path} lines {start}-{end}")
        } else {
            truncate(&self.content, SUMMARY_CHARS)
        }
    }
}

const SUMMARY_CHARS: usize = 200;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text.get(..cut).unwrap_or(text)),
        None => text.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: String, detail: String },

    #[error("{tool} failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("{tool} timed out after {after:?}")]
    TimedOut { tool: String, after: Duration },

    #[error("{tool} panicked: {message}")]
    Panicked { tool: String, message: String },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::UnknownTool { .. } => ErrorKind::UnknownTool,
            DispatchError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            DispatchError::ToolExecution { source, .. } => source.kind(),
            DispatchError::TimedOut { .. } | DispatchError::Panicked { .. } => {
                ErrorKind::ToolExecutionError
            }
        }
    }

    /// Innermost error message below the tool error, if any
    fn root_cause(&self) -> Option<String> {
        let mut cause = self.source()?.source()?;
        while let Some(next) = cause.source() {
            cause = next;
        }
        Some(cause.to_string())
    }
}

/// Routes tool calls to the registry under a per-call timeout
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    tool_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext, tool_timeout: Duration) -> Self {
        Self {
            registry,
            ctx,
            tool_timeout,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Run one call; failures come back as an error envelope.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let result = self.try_dispatch(call).await;
        let duration_ms = start.elapsed().as_millis();

        match result {
            Ok(value) => {
                tracing::info!(tool = %call.name, id = %call.id, duration_ms, "Tool call succeeded");
                ToolResult::success(&call.id, &value)
            }
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    id = %call.id,
                    duration_ms,
                    kind = %e.kind(),
                    error = %e,
                    "Tool call failed"
                );
                ToolResult::error(&call.id, &e)
            }
        }
    }

    pub async fn try_dispatch(&self, call: &ToolCall) -> Result<Value, DispatchError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| DispatchError::UnknownTool {
                name: call.name.clone(),
            })?;

        let args = validate(&tool.params(), &call.arguments).map_err(|detail| {
            DispatchError::InvalidArguments {
                tool: call.name.clone(),
                detail,
            }
        })?;

        let ctx = self.ctx.clone();
        let mut handle = tokio::spawn(async move { tool.run(args, ctx).await });

        match tokio::time::timeout(self.tool_timeout, &mut handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(source))) => Err(DispatchError::ToolExecution {
                tool: call.name.clone(),
                source,
            }),
            Ok(Err(join_error)) => Err(DispatchError::Panicked {
                tool: call.name.clone(),
                message: panic_message(join_error),
            }),
            Err(_) => {
                handle.abort();
                Err(DispatchError::TimedOut {
                    tool: call.name.clone(),
                    after: self.tool_timeout,
                })
            }
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Check raw model arguments against declared parameters.
///
/// `null` counts as absent. Arguments that arrived as an unparsable string
/// are rejected rather than replaced by `{}`.
pub fn validate(params: &[ParamSpec], raw: &Value) -> Result<ToolArgs, String> {
    let parsed;
    let raw = match raw {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| format!("arguments are not valid JSON: {e}"))?;
            &parsed
        }
        other => other,
    };

    let mut values = match raw {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(format!(
                "arguments must be a JSON object, got {}",
                json_type(other)
            ))
        }
    };
    values.retain(|_, v| !v.is_null());

    let mut unexpected: Vec<&str> = values
        .keys()
        .filter(|key| !params.iter().any(|p| p.name == key.as_str()))
        .map(String::as_str)
        .collect();
    if !unexpected.is_empty() {
        unexpected.sort_unstable();
        return Err(format!("unexpected argument(s): {}", unexpected.join(", ")));
    }

    for param in params {
        match values.get(param.name) {
            Some(value) if !param.kind.accepts(value) => {
                return Err(format!(
                    "`{}` must be {}, got {}",
                    param.name,
                    param.kind.name(),
                    json_type(value)
                ));
            }
            Some(_) => {}
            None if param.required => {
                return Err(format!("missing required argument `{}`", param.name));
            }
            None => {
                if let Some(default) = &param.default {
                    values.insert(param.name.to_string(), default.clone());
                }
            }
        }
    }

    Ok(ToolArgs::new(values))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
