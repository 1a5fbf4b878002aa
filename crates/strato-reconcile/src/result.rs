//! Per-entity reconciliation outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ReconcileError;

/// Terminal outcome of reconciling one entity.
///
/// Never `Pending`: the engine does not return control while an
/// asynchronous mutation is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No entity matched the natural key; one was created.
    Created,
    /// An entity matched but its spec differed; it was updated.
    Updated,
    /// An unaccounted entity was deleted.
    Deleted,
    /// The matching entity already had the desired spec.
    Unchanged,
    /// The entity has no desired spec and deletion was not requested.
    Unaccounted,
    /// Reconciliation of this entity failed; see the error message.
    Error,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::Updated => "updated",
            ReconcileOutcome::Deleted => "deleted",
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Unaccounted => "unaccounted",
            ReconcileOutcome::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of reconciling one entity.
///
/// Produced once per desired spec and once per unaccounted actual
/// entity. `entity` is the latest known state: the post-mutation read
/// on success, or the best-known pre-mutation snapshot (possibly a
/// synthesized stub) when the outcome is `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResult<E> {
    pub entity: E,
    pub outcome: ReconcileOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<E> ReconcileResult<E> {
    /// A successful result with the given outcome.
    pub fn ok(entity: E, outcome: ReconcileOutcome) -> Self {
        Self {
            entity,
            outcome,
            error: None,
        }
    }

    /// A failed result carrying the error message.
    pub fn failed(entity: E, error: &ReconcileError) -> Self {
        Self {
            entity,
            outcome: ReconcileOutcome::Error,
            error: Some(error.to_string()),
        }
    }

    /// Whether this entity's reconciliation failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.outcome == ReconcileOutcome::Error
    }
}
