//! Asynchronous mutation operations.
//!
//! Every control-plane mutation (create/update/delete) may return an
//! operation handle that resolves to a terminal state later. The handle
//! is only meaningful while the operation is in flight; once terminal it
//! is discarded from the local model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// State of an in-flight asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Fulfilled,
    Failed,
    Cancelled,
}

impl OperationState {
    /// Whether the operation has reached a state it cannot leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationState::Pending)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Pending => "pending",
            OperationState::Fulfilled => "fulfilled",
            OperationState::Failed => "failed",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Handle for an in-flight control-plane mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncOperation {
    /// Opaque operation id assigned by the control plane.
    pub id: String,
    /// Current state.
    pub state: OperationState,
    /// Why the operation failed; set when `state` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Server hint for how long to wait before the next status check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_duration: Option<Duration>,
    /// When the control plane accepted the mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the operation reached its terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AsyncOperation {
    /// Create a pending operation handle.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: OperationState::Pending,
            failure_reason: None,
            check_duration: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// Create a fulfilled operation handle.
    pub fn fulfilled(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: OperationState::Fulfilled,
            failure_reason: None,
            check_duration: None,
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
        }
    }

    /// Create a failed operation handle with a failure reason.
    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: OperationState::Failed,
            failure_reason: Some(reason.into()),
            check_duration: None,
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
        }
    }

    /// Set the server poll-pacing hint.
    #[must_use]
    pub fn with_check_duration(mut self, check_duration: Duration) -> Self {
        self.check_duration = Some(check_duration);
        self
    }
}
