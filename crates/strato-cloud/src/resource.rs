//! Tenant-scoped resource model: namespaces and user accounts.
//!
//! A *spec* is the desired, user-authored configuration of a resource,
//! identified by a natural key (namespace name, user email). An
//! *entity* is the actual remote resource, carrying the opaque id the
//! control plane assigned and the `resource_version` optimistic
//! concurrency token it was last read with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A spec failed validation before any remote call was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} spec: {message}")]
pub struct InvalidSpec {
    /// Resource kind the spec belongs to.
    pub kind: &'static str,
    /// What is wrong with the spec.
    pub message: String,
}

impl InvalidSpec {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Desired configuration of a resource, keyed by a natural key unique
/// within its kind.
pub trait ResourceSpec:
    Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Human-readable resource kind, used in log fields and error
    /// messages ("namespace", "user").
    const KIND: &'static str;

    /// The user-meaningful unique identifier within the kind.
    fn natural_key(&self) -> &str;

    /// Validate the spec before any remote call.
    fn validate(&self) -> Result<(), InvalidSpec>;
}

/// An actual remote resource as last observed.
pub trait ResourceEntity: Clone + fmt::Debug + Send + Sync + 'static {
    /// The spec type this entity materializes.
    type Spec: ResourceSpec;

    /// Opaque id assigned by the control plane.
    fn id(&self) -> &str;

    /// The observed configuration.
    fn spec(&self) -> &Self::Spec;

    /// Optimistic-concurrency token from the last read. Required on
    /// every update/delete so the control plane can detect concurrent
    /// modification.
    fn resource_version(&self) -> &str;

    /// Synthesize a stub entity from an id and a spec.
    ///
    /// Used to report a best-known snapshot when a mutation partially
    /// succeeded and no fresh read is available; the stub carries an
    /// empty resource version and must never be used for a mutation.
    fn from_spec(id: String, spec: Self::Spec) -> Self;

    /// The natural key, delegated to the spec.
    fn natural_key(&self) -> &str {
        self.spec().natural_key()
    }
}

/// Account-level role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Owner,
    Admin,
    Developer,
    Read,
}

/// Per-namespace permission of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespacePermission {
    Admin,
    Write,
    Read,
}

/// Desired configuration of a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    /// Namespace name; the natural key.
    pub name: String,
    /// Regions the namespace is provisioned in.
    pub regions: Vec<String>,
    /// History retention in days.
    pub retention_days: u16,
}

impl ResourceSpec for NamespaceSpec {
    const KIND: &'static str = "namespace";

    fn natural_key(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), InvalidSpec> {
        if self.name.is_empty() {
            return Err(InvalidSpec::new(Self::KIND, "name is required"));
        }
        if self.regions.is_empty() {
            return Err(InvalidSpec::new(Self::KIND, "at least one region is required"));
        }
        if self.retention_days == 0 {
            return Err(InvalidSpec::new(Self::KIND, "retention_days must be at least 1"));
        }
        Ok(())
    }
}

/// An actual namespace on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
    pub spec: NamespaceSpec,
    pub resource_version: String,
}

impl ResourceEntity for Namespace {
    type Spec = NamespaceSpec;

    fn id(&self) -> &str {
        &self.id
    }

    fn spec(&self) -> &NamespaceSpec {
        &self.spec
    }

    fn resource_version(&self) -> &str {
        &self.resource_version
    }

    fn from_spec(id: String, spec: NamespaceSpec) -> Self {
        Self {
            id,
            spec,
            resource_version: String::new(),
        }
    }
}

/// Desired configuration of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    /// User email; the natural key.
    pub email: String,
    /// Account-wide role.
    pub account_role: AccountRole,
    /// Per-namespace permissions, keyed by namespace name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespace_permissions: BTreeMap<String, NamespacePermission>,
}

impl ResourceSpec for UserSpec {
    const KIND: &'static str = "user";

    fn natural_key(&self) -> &str {
        &self.email
    }

    fn validate(&self) -> Result<(), InvalidSpec> {
        if self.email.is_empty() {
            return Err(InvalidSpec::new(Self::KIND, "email is required"));
        }
        if !self.email.contains('@') {
            return Err(InvalidSpec::new(
                Self::KIND,
                format!("email {:?} is not an address", self.email),
            ));
        }
        Ok(())
    }
}

/// An actual user account on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub spec: UserSpec,
    pub resource_version: String,
}

impl ResourceEntity for User {
    type Spec = UserSpec;

    fn id(&self) -> &str {
        &self.id
    }

    fn spec(&self) -> &UserSpec {
        &self.spec
    }

    fn resource_version(&self) -> &str {
        &self.resource_version
    }

    fn from_spec(id: String, spec: UserSpec) -> Self {
        Self {
            id,
            spec,
            resource_version: String::new(),
        }
    }
}
