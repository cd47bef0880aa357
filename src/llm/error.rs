//! LLM error types

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// LLM error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Provider returned neither text nor tool calls
    pub fn empty_response() -> Self {
        Self::new(LlmErrorKind::Unknown, "Provider returned an empty response")
    }

    /// Map an HTTP failure status onto an error kind
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
            429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
            400 | 404 | 422 => LlmError::invalid_request(format!("Invalid request: {message}")),
            500..=599 => LlmError::server_error(format!("Server error: {message}")),
            _ => LlmError::unknown(format!("HTTP {status}: {message}")),
        }
    }

    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            LlmError::network(format!("Connection failed: {e}"))
        } else {
            LlmError::unknown(format!("Request failed: {e}"))
        }
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// Network issues, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400); never retried
    InvalidRequest,
    /// Unknown error, including empty responses
    Unknown,
}

impl LlmErrorKind {
    /// Only a request the provider rejected as malformed is final.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::InvalidRequest)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(LlmError::from_status(401, "x").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::from_status(403, "x").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::from_status(429, "x").kind, LlmErrorKind::RateLimit);
        assert_eq!(
            LlmError::from_status(400, "x").kind,
            LlmErrorKind::InvalidRequest
        );
        assert_eq!(
            LlmError::from_status(503, "x").kind,
            LlmErrorKind::ServerError
        );
        assert_eq!(LlmError::from_status(302, "x").kind, LlmErrorKind::Unknown);
    }

    #[test]
    fn test_only_invalid_request_is_final() {
        assert!(LlmErrorKind::Auth.is_retryable());
        assert!(LlmErrorKind::Network.is_retryable());
        assert!(LlmErrorKind::Unknown.is_retryable());
        assert!(!LlmErrorKind::InvalidRequest.is_retryable());
    }
}
