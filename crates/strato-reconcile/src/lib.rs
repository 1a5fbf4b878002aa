//! # strato-reconcile
//!
//! Reconciliation engine for Strato cloud resources.
//!
//! Given a desired set of resource specs and a [`CloudService`]
//! implementation, the engine computes and applies the minimal set of
//! create/update/delete mutations against the actual remote state,
//! waits each asynchronous mutation to a terminal state, and reports a
//! structured per-entity outcome. Entities in a batch are reconciled
//! sequentially; a single entity's failure is recorded in its result
//! and never aborts the rest (unless [`config::ErrorPolicy::FailFast`]
//! is selected).
//!
//! The engine issues every remote call through a
//! [`strato_cloud::CallPolicy`], so transient control-plane failures
//! are retried invisibly; only terminal failures reach a result. The
//! whole run is safe to retry from scratch: it holds no state of its
//! own, and the control plane's optimistic-concurrency tokens guard
//! against lost updates.
//!
//! ## Example
//!
//! ```ignore
//! use strato_reconcile::{ReconcileConfig, Reconciler};
//!
//! let reconciler = Reconciler::with_config(
//!     service,
//!     ReconcileConfig::default().with_delete_unaccounted(true),
//! );
//! let results = reconciler.reconcile_namespaces(desired).await?;
//! for result in &results {
//!     println!("{} -> {}", result.entity.spec.name, result.outcome);
//! }
//! ```

pub mod config;
pub mod error;
pub mod result;
pub mod waiter;

mod batch;
mod entity;

pub use config::{ErrorPolicy, ReconcileConfig};
pub use error::ReconcileError;
pub use result::{ReconcileOutcome, ReconcileResult};
pub use waiter::OperationWaiter;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use strato_cloud::resource::{ResourceEntity, ResourceSpec};
use strato_cloud::{CloudService, Namespace, NamespaceSpec, ResourceClient, User, UserSpec};

use std::time::Duration;

/// The reconciliation engine.
///
/// One accessor pair per resource kind, bound at compile time through
/// [`CloudService`]; there is no runtime registry of kinds.
pub struct Reconciler {
    service: Arc<dyn CloudService>,
    config: ReconcileConfig,
    cancel: CancellationToken,
}

impl Reconciler {
    /// Create an engine with the default configuration.
    pub fn new(service: Arc<dyn CloudService>) -> Self {
        Self::with_config(service, ReconcileConfig::default())
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(service: Arc<dyn CloudService>, config: ReconcileConfig) -> Self {
        Self {
            service,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token. Cancelling it makes in-flight waits
    /// return promptly and stops the batch before its next entity;
    /// results already produced are not retracted by the engine.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile a single namespace spec.
    #[instrument(skip_all, fields(name = %spec.name))]
    pub async fn reconcile_namespace(
        &self,
        spec: NamespaceSpec,
    ) -> Result<ReconcileResult<Namespace>, ReconcileError> {
        self.reconcile_one(
            self.service.namespaces(),
            spec,
            self.config.namespace_mutation_timeout,
        )
        .await
    }

    /// Reconcile a full desired list of namespaces.
    #[instrument(skip_all, fields(count = specs.len()))]
    pub async fn reconcile_namespaces(
        &self,
        specs: Vec<NamespaceSpec>,
    ) -> Result<Vec<ReconcileResult<Namespace>>, ReconcileError> {
        self.reconcile_many(
            self.service.namespaces(),
            specs,
            self.config.namespace_mutation_timeout,
        )
        .await
    }

    /// Reconcile a single user spec.
    #[instrument(skip_all, fields(email = %spec.email))]
    pub async fn reconcile_user(
        &self,
        spec: UserSpec,
    ) -> Result<ReconcileResult<User>, ReconcileError> {
        self.reconcile_one(self.service.users(), spec, self.config.user_mutation_timeout)
            .await
    }

    /// Reconcile a full desired list of users.
    #[instrument(skip_all, fields(count = specs.len()))]
    pub async fn reconcile_users(
        &self,
        specs: Vec<UserSpec>,
    ) -> Result<Vec<ReconcileResult<User>>, ReconcileError> {
        self.reconcile_many(self.service.users(), specs, self.config.user_mutation_timeout)
            .await
    }

    /// Fetch the namespace with the given name, if any.
    ///
    /// Fails with [`ReconcileError::AmbiguousMatch`] when the control
    /// plane holds more than one namespace with that name.
    pub async fn get_namespace_with_name(
        &self,
        name: &str,
    ) -> Result<Option<Namespace>, ReconcileError> {
        entity::find_by_natural_key(self.service.namespaces(), &self.config.call_policy, name).await
    }

    /// Fetch the user with the given email, if any.
    pub async fn get_user_with_email(&self, email: &str) -> Result<Option<User>, ReconcileError> {
        entity::find_by_natural_key(self.service.users(), &self.config.call_policy, email).await
    }

    /// List all namespaces, following pagination to exhaustion.
    pub async fn list_all_namespaces(&self) -> Result<Vec<Namespace>, ReconcileError> {
        entity::list_filtered(self.service.namespaces(), &self.config.call_policy, None).await
    }

    /// List all users, following pagination to exhaustion.
    pub async fn list_all_users(&self) -> Result<Vec<User>, ReconcileError> {
        entity::list_filtered(self.service.users(), &self.config.call_policy, None).await
    }

    fn waiter(&self) -> OperationWaiter<'_> {
        OperationWaiter::new(
            self.service.operations(),
            &self.config.call_policy,
            self.config.min_poll_interval,
            self.cancel.clone(),
        )
    }

    async fn reconcile_one<E: ResourceEntity>(
        &self,
        client: &dyn ResourceClient<Entity = E>,
        spec: E::Spec,
        mutation_timeout: Duration,
    ) -> Result<ReconcileResult<E>, ReconcileError> {
        spec.validate()?;
        let lookup = match entity::find_by_natural_key(
            client,
            &self.config.call_policy,
            spec.natural_key(),
        )
        .await
        {
            Ok(lookup) => lookup,
            Err(error @ ReconcileError::AmbiguousMatch { .. }) => {
                // Data-integrity violation in the remote system: fail
                // this entity without attempting any mutation.
                let stub = E::from_spec(String::new(), spec);
                return Ok(ReconcileResult::failed(stub, &error));
            }
            Err(error) => return Err(error),
        };
        Ok(entity::reconcile_entity(
            client,
            &self.waiter(),
            &self.config.call_policy,
            spec,
            lookup,
            mutation_timeout,
        )
        .await)
    }

    async fn reconcile_many<E: ResourceEntity>(
        &self,
        client: &dyn ResourceClient<Entity = E>,
        specs: Vec<E::Spec>,
        mutation_timeout: Duration,
    ) -> Result<Vec<ReconcileResult<E>>, ReconcileError> {
        batch::reconcile_batch(
            client,
            &self.waiter(),
            &self.config,
            &self.cancel,
            specs,
            mutation_timeout,
        )
        .await
    }
}
