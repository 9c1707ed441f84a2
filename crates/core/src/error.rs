//! Error types for the Tandem engine.
//!
//! Each bounded context gets its own error enum; the top-level [`Error`]
//! aggregates them for callers that sit above a single context.

use thiserror::Error;

/// Top-level error type aggregating all subsystem errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from model backends (HTTP transport, API surface, streaming).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("request exceeds the model's context window: {0}")]
    ContextLengthExceeded(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),
}

impl BackendError {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimited { .. }
                | BackendError::Network(_)
                | BackendError::Timeout(_)
                | BackendError::StreamInterrupted(_)
        )
    }
}

/// Errors from tool lookup and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool '{tool_name}' failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution timed out after {0}s")]
    Timeout(u64),
}

/// Errors from the conversation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_converts_to_top_level() {
        let err: Error = BackendError::Timeout(30).into();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn retryable_classification() {
        assert!(BackendError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(BackendError::Network("connection reset".into()).is_retryable());
        assert!(!BackendError::AuthenticationFailed("bad key".into()).is_retryable());
        assert!(!BackendError::ContextLengthExceeded("too long".into()).is_retryable());
    }

    #[test]
    fn error_display_includes_context() {
        let err = ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason: "division by zero".into(),
        };
        assert!(err.to_string().contains("calculator"));
        assert!(err.to_string().contains("division by zero"));
    }
}
