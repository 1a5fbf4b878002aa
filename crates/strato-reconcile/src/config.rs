//! Reconciliation engine configuration.

use std::time::Duration;
use strato_cloud::CallPolicy;

/// What a batch run does when one entity's reconciliation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Record the failure in its result and keep reconciling the rest.
    #[default]
    Continue,
    /// Stop after the first failed entity and return the results
    /// gathered so far; the unaccounted phase is skipped.
    FailFast,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Delete actual entities that no desired spec accounts for.
    /// When false (the default) they are reported as `Unaccounted`
    /// and left untouched.
    pub delete_unaccounted: bool,
    /// Batch behavior on per-entity failure.
    pub error_policy: ErrorPolicy,
    /// How long to wait for a namespace mutation to resolve.
    pub namespace_mutation_timeout: Duration,
    /// How long to wait for a user mutation to resolve.
    pub user_mutation_timeout: Duration,
    /// Floor for the operation poll interval. A zero or absent server
    /// pacing hint is clamped up to this so polling cannot busy-loop.
    pub min_poll_interval: Duration,
    /// Retry policy applied to every control-plane call.
    pub call_policy: CallPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            delete_unaccounted: false,
            error_policy: ErrorPolicy::Continue,
            namespace_mutation_timeout: Duration::from_secs(30 * 60),
            user_mutation_timeout: Duration::from_secs(10 * 60),
            min_poll_interval: Duration::from_secs(1),
            call_policy: CallPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    /// Request deletion of unaccounted entities.
    #[must_use]
    pub fn with_delete_unaccounted(mut self, delete: bool) -> Self {
        self.delete_unaccounted = delete;
        self
    }

    /// Set the batch error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert!(!config.delete_unaccounted);
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
        assert_eq!(config.namespace_mutation_timeout, Duration::from_secs(1800));
        assert_eq!(config.user_mutation_timeout, Duration::from_secs(600));
        assert_eq!(config.min_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_builders() {
        let config = ReconcileConfig::default()
            .with_delete_unaccounted(true)
            .with_error_policy(ErrorPolicy::FailFast);
        assert!(config.delete_unaccounted);
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
    }
}
