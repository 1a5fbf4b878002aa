//! Reconciliation error taxonomy.

use std::time::Duration;
use strato_cloud::ApiError;
use strato_cloud::resource::InvalidSpec;
use thiserror::Error;

/// Error produced while reconciling resources.
///
/// Per-entity failures are normally folded into a
/// [`crate::result::ReconcileResult`] with an `Error` outcome; a
/// `ReconcileError` only escapes a batch call for total failures
/// (the initial listing never succeeding, invalid input to a
/// single-entity call, or cancellation of the whole run).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired spec is malformed; no remote call was made.
    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpec),

    /// More than one remote entity shares the natural key. This is a
    /// data-integrity violation in the remote system; the engine
    /// refuses to pick one.
    #[error("multiple {kind} entities found for natural key {key:?}")]
    AmbiguousMatch { kind: &'static str, key: String },

    /// A remote call failed with a terminal status (transient failures
    /// are retried inside the call policy and never reach this level).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An asynchronous mutation resolved to the failed state.
    #[error("async operation {operation_id} failed: {reason}")]
    OperationFailed {
        operation_id: String,
        reason: String,
    },

    /// An asynchronous mutation was cancelled by the control plane.
    #[error("async operation {operation_id} was cancelled by the control plane")]
    OperationCancelled { operation_id: String },

    /// An asynchronous mutation did not reach a terminal state in time.
    #[error("timed out waiting for async operation {operation_id} after {timeout:?}")]
    OperationTimeout {
        operation_id: String,
        timeout: Duration,
    },

    /// The reconciliation run itself was cancelled.
    #[error("reconciliation run was cancelled")]
    RunCancelled,
}
