//! Resource, argument, and capability-grant definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strongly-typed logical resource name, e.g. "governanceToken".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Resource type tag, assigned at plan-build time.
///
/// The engine never interprets the tag; it is passed to the backend's
/// `create` call and used by the blueprint to distinguish resource roles
/// without reflecting on names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(pub String);

impl ResourceKind {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKind {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Address/handle of a provisioned resource, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A typed constructor or method argument.
///
/// `ResourceRef` values are placeholders resolved to concrete addresses by
/// the engine just before execution; everything else passes through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Str(String),
    Uint(u64),
    Bool(bool),
    Address(Address),
    ResourceRef(ResourceId),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Collect every resource reference in this value, depth-first.
    pub fn referenced_resources(&self, out: &mut Vec<ResourceId>) {
        match self {
            ArgValue::ResourceRef(id) => out.push(id.clone()),
            ArgValue::List(items) => {
                for item in items {
                    item.referenced_resources(out);
                }
            }
            _ => {}
        }
    }
}

/// Provisioning status of a resource within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Provisioned,
    Failed,
}

/// A provisioned entity declared by the plan.
///
/// Owned by the Plan; only the engine mutates `address` and `status`
/// (on its own working copy) while a run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub constructor_args: Vec<ArgValue>,
    #[serde(default)]
    pub address: Option<Address>,
    pub status: ResourceStatus,
}

impl Resource {
    pub fn new(id: impl Into<ResourceId>, kind: impl Into<ResourceKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            constructor_args: Vec::new(),
            address: None,
            status: ResourceStatus::Pending,
        }
    }

    pub fn with_constructor_args(mut self, args: Vec<ArgValue>) -> Self {
        self.constructor_args = args;
        self
    }
}

/// Role scope of a capability grant.
///
/// An explicit tag, never inferred from resource naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantRole {
    /// Grantee may act on the grantor's state (setHandler in the original).
    Handler,
    /// Grantee may mint the grantor token (setMinter).
    Minter,
    /// Grantee is an approved router of the grantor (addRouter).
    Router,
}

impl fmt::Display for GrantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrantRole::Handler => "handler",
            GrantRole::Minter => "minter",
            GrantRole::Router => "router",
        };
        f.write_str(name)
    }
}

/// A directed authorization edge: grantor authorizes grantee for a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub grantor: ResourceId,
    pub grantee: ResourceId,
    pub role: GrantRole,
}

impl CapabilityGrant {
    pub fn new(
        grantor: impl Into<ResourceId>,
        grantee: impl Into<ResourceId>,
        role: GrantRole,
    ) -> Self {
        Self {
            grantor: grantor.into(),
            grantee: grantee.into(),
            role,
        }
    }
}
