//! Capability traits for the control-plane client.
//!
//! The reconciliation engine never talks to the network itself; it is
//! handed an implementation of [`CloudService`] and invokes the typed
//! per-kind operations below. Mutations are asynchronous: create,
//! update, and delete may return an [`AsyncOperation`] handle that the
//! caller must poll to completion via [`OperationClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::operation::AsyncOperation;
use crate::resource::{Namespace, ResourceEntity, User};

/// Request for one page of a resource listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Restrict the listing to entities with this natural key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_key: Option<String>,
    /// Opaque continuation token from the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl ListRequest {
    /// List everything, from the first page.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// List entities matching a natural key.
    pub fn by_natural_key(key: impl Into<String>) -> Self {
        Self {
            natural_key: Some(key.into()),
            page_token: None,
        }
    }

    /// Continue from the given page token.
    #[must_use]
    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

/// One page of a resource listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse<E> {
    /// Entities in this page.
    pub entities: Vec<E>,
    /// Token for the next page; `None` when this is the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Response to a create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Id assigned to the new entity.
    pub id: String,
    /// In-flight mutation handle, when the create is asynchronous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_operation: Option<AsyncOperation>,
}

/// Response to an update or delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResponse {
    /// In-flight mutation handle, when the mutation is asynchronous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_operation: Option<AsyncOperation>,
}

/// Typed CRUD surface for one resource kind.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// The entity kind this client manages.
    type Entity: ResourceEntity;

    /// Fetch a single entity by its control-plane id.
    ///
    /// Returns `Ok(None)` when no entity with that id exists.
    async fn get(&self, id: &str) -> ApiResult<Option<Self::Entity>>;

    /// Fetch one page of entities.
    async fn list(&self, request: ListRequest) -> ApiResult<ListResponse<Self::Entity>>;

    /// Create an entity from a spec.
    async fn create(&self, spec: <Self::Entity as ResourceEntity>::Spec)
        -> ApiResult<CreateResponse>;

    /// Update an entity. `resource_version` must be the token the
    /// entity was last read with; a stale token fails with a
    /// failed-precondition status.
    async fn update(
        &self,
        id: &str,
        spec: <Self::Entity as ResourceEntity>::Spec,
        resource_version: &str,
    ) -> ApiResult<MutationResponse>;

    /// Delete an entity, subject to the same resource-version check.
    async fn delete(&self, id: &str, resource_version: &str) -> ApiResult<MutationResponse>;
}

/// Status endpoint for asynchronous operations.
#[async_trait]
pub trait OperationClient: Send + Sync {
    /// Fetch the current state of an operation.
    async fn get_operation(&self, id: &str) -> ApiResult<AsyncOperation>;
}

/// The full control-plane surface the reconciliation engine consumes.
///
/// One accessor per resource kind, resolved at compile time; adding a
/// kind means adding an accessor here and an entry point on the engine,
/// not registering anything at runtime.
pub trait CloudService: OperationClient {
    /// Namespace operations.
    fn namespaces(&self) -> &dyn ResourceClient<Entity = Namespace>;

    /// User account operations.
    fn users(&self) -> &dyn ResourceClient<Entity = User>;

    /// The async-operation status endpoint (usually `self`).
    fn operations(&self) -> &dyn OperationClient;
}
