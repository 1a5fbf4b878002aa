//! Control-plane API error types.
//!
//! Error definitions with terminal/transient classification for retry
//! logic.

use thiserror::Error;

use crate::status::StatusCode;

/// Error returned by a control-plane call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The control plane returned a structured status.
    #[error("{code}: {message}")]
    Status {
        code: StatusCode,
        message: String,
    },

    /// The call failed below the application layer (connection reset,
    /// DNS failure, protocol error). There is no structured status, so
    /// the failure is always treated as transient.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ApiError {
    /// Create a status error.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Status {
            code,
            message: message.into(),
        }
    }

    /// Create a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        ApiError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with an underlying source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApiError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found status error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(StatusCode::NotFound, message)
    }

    /// Create a failed-precondition status error (the code the control
    /// plane uses for resource-version conflicts).
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::status(StatusCode::FailedPrecondition, message)
    }

    /// Create a deadline-exceeded status error.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::status(StatusCode::DeadlineExceeded, message)
    }

    /// The structured status code, if the error carries one.
    #[must_use]
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            ApiError::Transport { .. } => None,
        }
    }

    /// Whether this error is transient and the call may be retried.
    ///
    /// Transport failures and retryable status codes are transient;
    /// the calling retry policy is allowed to repeat the call without
    /// anyone above it observing the intermediate failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Status { code, .. } => code.is_transient(),
            ApiError::Transport { .. } => true,
        }
    }

    /// Whether this error is terminal and retrying cannot help.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_transient()
    }
}

/// Result type for control-plane calls.
pub type ApiResult<T> = Result<T, ApiError>;
