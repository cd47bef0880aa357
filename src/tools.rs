//! Research tools exposed to the agent
//!
//! Tools are stateless singletons. Everything a call needs arrives through
//! [`ToolContext`], which is built once per process and shared read-only by
//! every conversation.

mod file_search;
mod index_search;
mod list_paths;
mod read_file_range;

pub use file_search::FileSearchTool;
pub use index_search::{IndexClient, IndexError, IndexSearchTool};
pub use list_paths::ListPathsTool;
pub use read_file_range::ReadFileRangeTool;

use crate::error::ErrorKind;
use crate::llm::ToolDefinition;
use crate::sandbox::{Sandbox, SandboxError};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Shared, read-only resources available to every tool call
#[derive(Clone)]
pub struct ToolContext {
    pub sandbox: Arc<Sandbox>,
    pub index: Option<Arc<IndexClient>>,
}

impl ToolContext {
    pub fn new(sandbox: Arc<Sandbox>, index: Option<Arc<IndexClient>>) -> Self {
        Self { sandbox, index }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Kind of the underlying failure, before the dispatcher wraps it
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Sandbox(e) => e.kind(),
            ToolError::Index(_) | ToolError::Failed(_) => ErrorKind::ToolExecutionError,
        }
    }
}

/// Wire types a parameter may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }

    fn schema(self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
        }
    }
}

/// Declared parameter of a tool
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// JSON schema derived from declared parameters
pub fn schema_for(params: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    for param in params {
        let mut schema = param.kind.schema();
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("description".into(), json!(param.description));
            if let Some(default) = &param.default {
                obj.insert("default".into(), default.clone());
            }
        }
        properties.insert(param.name.to_string(), schema);
    }
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name)
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Arguments that already passed validation against a tool's [`ParamSpec`]s,
/// with defaults filled in.
#[derive(Debug, Clone, Default)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_u64().map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
        })
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Integer argument clamped into `[min, max]`
    pub fn bounded(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.int(name)
            .map(|n| usize::try_from(n.max(0)).unwrap_or(max).clamp(min, max))
    }
}

/// Run synchronous corpus access off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SandboxError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ToolError::from),
        Err(e) => Err(ToolError::Failed(format!("corpus task failed: {e}"))),
    }
}

/// A tool the agent can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Description for the LLM
    fn description(&self) -> String;

    /// Declared parameters; the dispatcher validates against these
    fn params(&self) -> Vec<ParamSpec>;

    fn input_schema(&self) -> Value {
        schema_for(&self.params())
    }

    async fn run(&self, args: ToolArgs, ctx: ToolContext) -> Result<Value, ToolError>;
}

/// Collection of tools available to conversations
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The corpus tools, plus `index_search` when an index is configured
    pub fn standard(with_index: bool) -> Self {
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ListPathsTool),
            Arc::new(ReadFileRangeTool),
            Arc::new(FileSearchTool),
        ];
        if with_index {
            tools.push(Arc::new(IndexSearchTool));
        }
        Self { tools }
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}
