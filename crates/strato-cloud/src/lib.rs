//! # strato-cloud
//!
//! Typed surface of the Strato control-plane API: the resource model
//! (namespaces, user accounts), asynchronous operation handles, the
//! capability traits a concrete transport implements, and the retry
//! policy every call goes through.
//!
//! This crate carries no transport of its own. Connection setup, TLS,
//! and credential plumbing live with the [`client::CloudService`]
//! implementation; everything here is the contract the reconciliation
//! engine (`strato-reconcile`) is written against.

pub mod client;
pub mod error;
pub mod operation;
pub mod resource;
pub mod retry;
pub mod status;

pub use client::{
    CloudService, CreateResponse, ListRequest, ListResponse, MutationResponse, OperationClient,
    ResourceClient,
};
pub use error::{ApiError, ApiResult};
pub use operation::{AsyncOperation, OperationState};
pub use resource::{
    AccountRole, InvalidSpec, Namespace, NamespacePermission, NamespaceSpec, ResourceEntity,
    ResourceSpec, User, UserSpec,
};
pub use retry::CallPolicy;
pub use status::StatusCode;
