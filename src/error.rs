//! Wire-level error taxonomy
//!
//! Every module-specific error maps onto one of these kinds. The kind is what
//! the LLM sees inside an error `ToolResult` and what consumers of the event
//! stream see in the terminal `error` frame.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SandboxViolation,
    UnsupportedType,
    QuerySyntaxError,
    UnknownTool,
    InvalidArguments,
    ToolExecutionError,
    ProviderError,
    StepLimitExceeded,
    Timeout,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SandboxViolation => "sandbox_violation",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::QuerySyntaxError => "query_syntax_error",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::ToolExecutionError => "tool_execution_error",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::StepLimitExceeded => "step_limit_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_as_str() {
        for kind in [
            ErrorKind::SandboxViolation,
            ErrorKind::UnsupportedType,
            ErrorKind::QuerySyntaxError,
            ErrorKind::UnknownTool,
            ErrorKind::InvalidArguments,
            ErrorKind::ToolExecutionError,
            ErrorKind::ProviderError,
            ErrorKind::StepLimitExceeded,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
        }
    }
}
