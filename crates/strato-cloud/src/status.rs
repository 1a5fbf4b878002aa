//! Control-plane status codes with terminal/transient classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code attached to a structured control-plane error.
///
/// Mirrors the gRPC status code space the control plane speaks. The
/// split between terminal and transient codes drives the whole retry
/// story: transient failures are retried by [`crate::retry::CallPolicy`]
/// without the caller ever observing them, terminal failures surface
/// immediately as the per-entity reconcile outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// Whether an error carrying this code is terminal.
    ///
    /// Terminal codes indicate the request itself is wrong or the
    /// remote state forbids it; retrying the identical call cannot
    /// succeed. Everything else is treated as a temporary condition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatusCode::InvalidArgument
                | StatusCode::NotFound
                | StatusCode::AlreadyExists
                | StatusCode::PermissionDenied
                | StatusCode::ResourceExhausted
                | StatusCode::FailedPrecondition
                | StatusCode::Aborted
                | StatusCode::OutOfRange
                | StatusCode::Unimplemented
                | StatusCode::Unauthenticated
        )
    }

    /// Whether an error carrying this code may be retried.
    #[must_use]
    pub fn is_transient(self) -> bool {
        !self.is_terminal()
    }

    /// The canonical wire name of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Cancelled => "cancelled",
            StatusCode::Unknown => "unknown",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Aborted => "aborted",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
