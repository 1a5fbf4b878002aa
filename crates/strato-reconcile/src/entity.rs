//! Single-entity reconciliation.
//!
//! Compares one desired spec against at most one actual entity and
//! issues the minimal mutation: create when no entity matches, update
//! when the specs differ, nothing when they are equal. Asynchronous
//! mutations are waited to completion and followed by a mandatory
//! re-read, because the immediate mutation response may not reflect
//! the eventual state.

use std::time::Duration;
use tracing::{debug, info, warn};

use strato_cloud::{ApiError, CallPolicy, ListRequest, ResourceClient};
use strato_cloud::resource::{ResourceEntity, ResourceSpec};

use crate::error::ReconcileError;
use crate::result::{ReconcileOutcome, ReconcileResult};
use crate::waiter::OperationWaiter;

/// Failure inside the apply step, together with the entity id that is
/// known at that point (set once a create has returned an id).
struct ApplyFailure {
    error: ReconcileError,
    entity_id: Option<String>,
}

impl ApplyFailure {
    fn new(error: impl Into<ReconcileError>, entity_id: Option<String>) -> Self {
        Self {
            error: error.into(),
            entity_id,
        }
    }
}

/// Reconcile one desired spec against a previously fetched lookup.
///
/// This never fails outward: any error is folded into the returned
/// result with an `Error` outcome and the best-known entity snapshot —
/// the pre-mutation lookup when one exists, otherwise a stub built
/// from the spec and whatever id a partial create produced.
pub(crate) async fn reconcile_entity<E: ResourceEntity>(
    client: &dyn ResourceClient<Entity = E>,
    waiter: &OperationWaiter<'_>,
    policy: &CallPolicy,
    spec: E::Spec,
    lookup: Option<E>,
    mutation_timeout: Duration,
) -> ReconcileResult<E> {
    let key = spec.natural_key().to_string();
    match apply_spec(client, waiter, policy, &spec, lookup.as_ref(), mutation_timeout).await {
        Ok((entity, outcome)) => {
            info!(kind = E::Spec::KIND, key, %outcome, "reconciled entity");
            ReconcileResult::ok(entity, outcome)
        }
        Err(failure) => {
            warn!(
                kind = E::Spec::KIND,
                key,
                error = %failure.error,
                "entity reconciliation failed"
            );
            let entity = match lookup {
                Some(existing) => existing,
                None => E::from_spec(failure.entity_id.unwrap_or_default(), spec),
            };
            ReconcileResult::failed(entity, &failure.error)
        }
    }
}

/// The single mutation decision plus the mandatory post-mutation read.
async fn apply_spec<E: ResourceEntity>(
    client: &dyn ResourceClient<Entity = E>,
    waiter: &OperationWaiter<'_>,
    policy: &CallPolicy,
    spec: &E::Spec,
    lookup: Option<&E>,
    mutation_timeout: Duration,
) -> Result<(E, ReconcileOutcome), ApplyFailure> {
    let kind = E::Spec::KIND;
    let (entity_id, operation, outcome) = match lookup {
        None => {
            let response = policy
                .invoke(&format!("create-{kind}"), || client.create(spec.clone()))
                .await
                .map_err(|e| ApplyFailure::new(e, None))?;
            (response.id, response.async_operation, ReconcileOutcome::Created)
        }
        Some(existing) if existing.spec() != spec => {
            let id = existing.id().to_string();
            let version = existing.resource_version();
            let response = policy
                .invoke(&format!("update-{kind}"), || {
                    client.update(&id, spec.clone(), version)
                })
                .await
                .map_err(|e| ApplyFailure::new(e, Some(id.clone())))?;
            (id, response.async_operation, ReconcileOutcome::Updated)
        }
        Some(existing) => {
            debug!(kind, key = spec.natural_key(), "spec already satisfied");
            return Ok((existing.clone(), ReconcileOutcome::Unchanged));
        }
    };

    if let Some(operation) = operation {
        waiter
            .wait(&operation.id, mutation_timeout)
            .await
            .map_err(|error| ApplyFailure {
                error,
                entity_id: Some(entity_id.clone()),
            })?;
    }

    // The mutation response may be stale; re-read for the final spec
    // and resource version.
    let entity = policy
        .invoke(&format!("get-{kind}"), || client.get(&entity_id))
        .await
        .map_err(|e| ApplyFailure::new(e, Some(entity_id.clone())))?
        .ok_or_else(|| {
            ApplyFailure::new(
                ApiError::not_found(format!("{kind} {entity_id} not found after mutation")),
                Some(entity_id.clone()),
            )
        })?;
    Ok((entity, outcome))
}

/// List entities to exhaustion, optionally filtered by natural key.
pub(crate) async fn list_filtered<E: ResourceEntity>(
    client: &dyn ResourceClient<Entity = E>,
    policy: &CallPolicy,
    natural_key: Option<&str>,
) -> Result<Vec<E>, ReconcileError> {
    let mut entities = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let request = ListRequest {
            natural_key: natural_key.map(str::to_string),
            page_token: page_token.take(),
        };
        let page = policy
            .invoke(&format!("list-{}", E::Spec::KIND), || client.list(request.clone()))
            .await?;
        entities.extend(page.entities);
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }
    Ok(entities)
}

/// Find the unique entity with the given natural key.
///
/// Returns [`ReconcileError::AmbiguousMatch`] when more than one entity
/// shares the key; the remote system guarantees uniqueness, so a
/// duplicate is a data-integrity violation the engine refuses to
/// resolve.
pub(crate) async fn find_by_natural_key<E: ResourceEntity>(
    client: &dyn ResourceClient<Entity = E>,
    policy: &CallPolicy,
    key: &str,
) -> Result<Option<E>, ReconcileError> {
    let mut matches = list_filtered(client, policy, Some(key)).await?;
    if matches.len() > 1 {
        return Err(ReconcileError::AmbiguousMatch {
            kind: E::Spec::KIND,
            key: key.to_string(),
        });
    }
    Ok(matches.pop())
}
