//! Step type definitions
//!
//! Step represents an atomic unit of work in a Plan: either provisioning a
//! resource or invoking one method on an already-provisioned resource.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Address, ArgValue, GrantRole, ResourceId, ResourceKind};

/// Strongly-typed Step ID.
///
/// Derived deterministically from phase index, step index, action kind, and
/// target resource, so ids are stable across runs of unchanged configuration.
/// Ledger matching depends on this stability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Canonical id form: `p01.s03.provision.vault`.
    pub fn derive(phase: usize, index: usize, kind: StepKind, resource: &ResourceId) -> Self {
        Self(format!("p{phase:02}.s{index:02}.{kind}.{resource}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Action kind tag, used in step ids and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Provision,
    Configure,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Provision => f.write_str("provision"),
            StepKind::Configure => f.write_str("configure"),
        }
    }
}

/// Capability grant attached to a Configure step.
///
/// The grantor is the step's target resource; the grantee and role are
/// declared here so the realized grant set can be checked against the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSpec {
    pub grantee: ResourceId,
    pub role: GrantRole,
}

impl GrantSpec {
    pub fn new(grantee: impl Into<ResourceId>, role: GrantRole) -> Self {
        Self {
            grantee: grantee.into(),
            role,
        }
    }
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Create the resource via the backend.
    Provision { resource: ResourceId },
    /// Invoke exactly one method on an already-provisioned resource.
    Configure {
        resource: ResourceId,
        method: String,
        args: Vec<ArgValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grant: Option<GrantSpec>,
    },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            StepAction::Provision { .. } => StepKind::Provision,
            StepAction::Configure { .. } => StepKind::Configure,
        }
    }

    /// The resource this step targets.
    pub fn resource(&self) -> &ResourceId {
        match self {
            StepAction::Provision { resource } => resource,
            StepAction::Configure { resource, .. } => resource,
        }
    }
}

/// A single step in the execution plan. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub action: StepAction,
    /// Steps that must be Completed before this one runs.
    #[serde(default)]
    pub depends_on: Vec<StepId>,
}

impl Step {
    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }
}

/// A step action after argument resolution.
///
/// All `ResourceRef`s have been substituted with concrete addresses; the
/// serialized form of this value is what the input hash covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolvedAction {
    Provision {
        kind: ResourceKind,
        args: Vec<ArgValue>,
    },
    Configure {
        target: Address,
        method: String,
        args: Vec<ArgValue>,
    },
}

/// Successful result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepOutput {
    /// Address assigned to a provisioned resource.
    Address(Address),
    /// Acknowledgment summary of a configure invocation.
    Receipt(String),
}

impl StepOutput {
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            StepOutput::Address(address) => Some(address),
            StepOutput::Receipt(_) => None,
        }
    }
}
