//! Waiter for asynchronous control-plane mutations.
//!
//! A mutation that returns an operation handle is not done until the
//! operation reaches a terminal state. [`OperationWaiter::wait`] polls
//! the status endpoint until the operation fulfills, fails, or is
//! cancelled, racing every step against the wait timeout and the run's
//! cancellation token.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strato_cloud::{AsyncOperation, CallPolicy, OperationClient, OperationState};

use crate::error::ReconcileError;

/// Polls an asynchronous operation to completion.
pub struct OperationWaiter<'a> {
    ops: &'a dyn OperationClient,
    policy: &'a CallPolicy,
    min_poll_interval: Duration,
    cancel: CancellationToken,
}

impl<'a> OperationWaiter<'a> {
    /// Create a waiter over the given status endpoint.
    pub fn new(
        ops: &'a dyn OperationClient,
        policy: &'a CallPolicy,
        min_poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ops,
            policy,
            min_poll_interval,
            cancel,
        }
    }

    /// Wait for the operation to reach a terminal state.
    ///
    /// The first status check is issued immediately; afterwards polling
    /// is paced by the server's `check_duration` hint, clamped to the
    /// configured floor. Ends in one of four ways:
    /// - `Ok(operation)` once the operation fulfills;
    /// - [`ReconcileError::OperationFailed`] /
    ///   [`ReconcileError::OperationCancelled`] when the control plane
    ///   reports a failure state;
    /// - [`ReconcileError::OperationTimeout`] when `timeout` elapses
    ///   before any terminal status;
    /// - [`ReconcileError::RunCancelled`] when the cancellation token
    ///   fires, which stops polling immediately and takes precedence
    ///   over any concurrently available status.
    pub async fn wait(
        &self,
        operation_id: &str,
        timeout: Duration,
    ) -> Result<AsyncOperation, ReconcileError> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // Zero delay before the first check; the common case is an
        // operation that already fulfilled.
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ReconcileError::RunCancelled),
                () = &mut deadline => return Err(self.timed_out(operation_id, timeout)),
                () = tokio::time::sleep(delay) => {}
            }

            let operation = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ReconcileError::RunCancelled),
                () = &mut deadline => return Err(self.timed_out(operation_id, timeout)),
                result = self.policy.invoke("get-async-operation", || {
                    self.ops.get_operation(operation_id)
                }) => result?,
            };

            match operation.state {
                OperationState::Fulfilled => {
                    debug!(operation_id, "async operation fulfilled");
                    return Ok(operation);
                }
                OperationState::Failed => {
                    let reason = operation
                        .failure_reason
                        .unwrap_or_else(|| "no failure reason reported".to_string());
                    warn!(operation_id, reason, "async operation failed");
                    return Err(ReconcileError::OperationFailed {
                        operation_id: operation.id,
                        reason,
                    });
                }
                OperationState::Cancelled => {
                    warn!(operation_id, "async operation cancelled by the control plane");
                    return Err(ReconcileError::OperationCancelled {
                        operation_id: operation.id,
                    });
                }
                OperationState::Pending => {
                    delay = operation
                        .check_duration
                        .unwrap_or(self.min_poll_interval)
                        .max(self.min_poll_interval);
                }
            }
        }
    }

    fn timed_out(&self, operation_id: &str, timeout: Duration) -> ReconcileError {
        warn!(operation_id, timeout_secs = timeout.as_secs(), "timed out waiting for async operation");
        ReconcileError::OperationTimeout {
            operation_id: operation_id.to_string(),
            timeout,
        }
    }
}
