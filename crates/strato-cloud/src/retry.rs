//! Durable invocation of control-plane calls.
//!
//! [`CallPolicy::invoke`] is the single way the engine issues a remote
//! call: each attempt is bounded by a start-to-close timeout, transient
//! failures are retried with exponential backoff for as long as the
//! optional schedule-to-close bound allows, and terminal failures are
//! returned immediately without retry.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// Retry and timeout policy for a single logical control-plane call.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Maximum duration of one attempt. An attempt that exceeds it is
    /// treated as a transient deadline-exceeded failure.
    pub start_to_close: Duration,
    /// Overall bound across all attempts. `None` retries transient
    /// failures indefinitely; the surrounding control flow (waiter
    /// timeout, run cancellation) bounds the call instead.
    pub schedule_to_close: Option<Duration>,
    /// Base delay for exponential backoff between attempts.
    pub base_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(60),
            schedule_to_close: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl CallPolicy {
    /// Policy with an overall schedule-to-close bound.
    #[must_use]
    pub fn bounded(schedule_to_close: Duration) -> Self {
        Self {
            schedule_to_close: Some(schedule_to_close),
            ..Self::default()
        }
    }

    /// Backoff delay before the given retry attempt (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Invoke a control-plane call under this policy.
    ///
    /// The closure is called once per attempt. Terminal errors are
    /// returned to the caller unchanged; everything else is retried.
    pub async fn invoke<T, F, Fut>(&self, operation: &str, f: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        match self.schedule_to_close {
            Some(bound) => match tokio::time::timeout(bound, self.attempts(operation, f)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(operation, bound_secs = bound.as_secs(), "call exhausted its schedule-to-close bound");
                    Err(ApiError::deadline_exceeded(format!(
                        "{operation} did not complete within {bound:?}"
                    )))
                }
            },
            None => self.attempts(operation, f).await,
        }
    }

    async fn attempts<T, F, Fut>(&self, operation: &str, mut f: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.start_to_close, f()).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::deadline_exceeded(format!(
                    "{operation} attempt timed out after {:?}",
                    self.start_to_close
                ))),
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempts = attempt + 1, "call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_terminal() => {
                    debug!(operation, error = %error, "call failed with terminal status");
                    return Err(error);
                }
                Err(error) => error,
            };

            let delay = self.delay_for(attempt);
            debug!(
                operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
