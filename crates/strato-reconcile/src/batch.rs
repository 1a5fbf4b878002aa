//! Batch reconciliation.
//!
//! Diffs a full desired list against the full actual listing. Actual
//! entities are indexed by natural key and popped as specs claim them,
//! so each entity is consumed by at most one spec and whatever remains
//! in the index afterwards is exactly the unaccounted set.

use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strato_cloud::{CallPolicy, ResourceClient};
use strato_cloud::resource::{ResourceEntity, ResourceSpec};

use crate::config::{ErrorPolicy, ReconcileConfig};
use crate::entity::{list_filtered, reconcile_entity};
use crate::error::ReconcileError;
use crate::result::{ReconcileOutcome, ReconcileResult};
use crate::waiter::OperationWaiter;

/// Reconcile a desired list of specs against all actual entities of
/// the kind.
///
/// Returns one result per spec in input order, followed by one result
/// per unaccounted entity (sorted by natural key for deterministic
/// output). Only a total failure — the initial listing never
/// succeeding, or cancellation of the run — escapes as an error;
/// per-entity failures are recorded in their results.
pub(crate) async fn reconcile_batch<E: ResourceEntity>(
    client: &dyn ResourceClient<Entity = E>,
    waiter: &OperationWaiter<'_>,
    config: &ReconcileConfig,
    cancel: &CancellationToken,
    specs: Vec<E::Spec>,
    mutation_timeout: Duration,
) -> Result<Vec<ReconcileResult<E>>, ReconcileError> {
    let entities = list_filtered(client, &config.call_policy, None).await?;
    info!(
        kind = E::Spec::KIND,
        desired = specs.len(),
        actual = entities.len(),
        delete_unaccounted = config.delete_unaccounted,
        "starting batch reconciliation"
    );

    // Group rather than overwrite so duplicate natural keys are
    // detectable instead of silently shadowed.
    let mut index: HashMap<String, Vec<E>> = HashMap::new();
    for entity in entities {
        index
            .entry(entity.natural_key().to_string())
            .or_default()
            .push(entity);
    }

    let fail_fast = config.error_policy == ErrorPolicy::FailFast;
    let mut results = Vec::with_capacity(specs.len());
    let mut aborted = false;

    for spec in specs {
        if cancel.is_cancelled() {
            return Err(ReconcileError::RunCancelled);
        }

        if let Err(invalid) = spec.validate() {
            let stub = E::from_spec(String::new(), spec);
            results.push(ReconcileResult::failed(stub, &invalid.into()));
            if fail_fast {
                aborted = true;
                break;
            }
            continue;
        }

        let lookup = match index.remove(spec.natural_key()) {
            Some(group) if group.len() > 1 => {
                // Duplicates are consumed here: they must not be
                // mutated and must not fall through as unaccounted.
                let error = ReconcileError::AmbiguousMatch {
                    kind: E::Spec::KIND,
                    key: spec.natural_key().to_string(),
                };
                let snapshot = group
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| E::from_spec(String::new(), spec.clone()));
                results.push(ReconcileResult::failed(snapshot, &error));
                if fail_fast {
                    aborted = true;
                    break;
                }
                continue;
            }
            Some(mut group) => group.pop(),
            None => None,
        };

        let result = reconcile_entity(
            client,
            waiter,
            &config.call_policy,
            spec,
            lookup,
            mutation_timeout,
        )
        .await;
        let failed = result.is_error();
        results.push(result);
        if failed && fail_fast {
            aborted = true;
            break;
        }
    }

    if aborted {
        warn!(
            kind = E::Spec::KIND,
            reconciled = results.len(),
            "batch aborted after first failure"
        );
        return Ok(results);
    }

    // Whatever survived the spec pass is unaccounted.
    let mut unaccounted: Vec<E> = index.into_values().flatten().collect();
    unaccounted.sort_by(|a, b| a.natural_key().cmp(b.natural_key()));

    for entity in unaccounted {
        if cancel.is_cancelled() {
            return Err(ReconcileError::RunCancelled);
        }
        if config.delete_unaccounted {
            results.push(delete_unaccounted_entity(client, &config.call_policy, entity).await);
        } else {
            results.push(ReconcileResult::ok(entity, ReconcileOutcome::Unaccounted));
        }
    }

    let errors = results.iter().filter(|r| r.is_error()).count();
    info!(
        kind = E::Spec::KIND,
        results = results.len(),
        errors,
        "batch reconciliation finished"
    );
    Ok(results)
}

async fn delete_unaccounted_entity<E: ResourceEntity>(
    client: &dyn ResourceClient<Entity = E>,
    policy: &CallPolicy,
    entity: E,
) -> ReconcileResult<E> {
    let outcome = policy
        .invoke(&format!("delete-{}", E::Spec::KIND), || {
            client.delete(entity.id(), entity.resource_version())
        })
        .await;
    match outcome {
        Ok(_) => {
            info!(
                kind = E::Spec::KIND,
                key = entity.natural_key(),
                id = entity.id(),
                "deleted unaccounted entity"
            );
            ReconcileResult::ok(entity, ReconcileOutcome::Deleted)
        }
        Err(error) => {
            warn!(
                kind = E::Spec::KIND,
                key = entity.natural_key(),
                id = entity.id(),
                %error,
                "failed to delete unaccounted entity"
            );
            let error = ReconcileError::Api(error);
            ReconcileResult::failed(entity, &error)
        }
    }
}
