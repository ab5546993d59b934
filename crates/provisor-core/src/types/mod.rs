//! Core type definitions for Provisor
//!
//! This module contains the fundamental types used throughout the system:
//! - Resource: a provisioned entity with id, kind, and address
//! - Step: atomic Provision or Configure action with dependencies
//! - Phase / Plan: the validated, ordered execution structure

mod plan;
mod resource;
mod step;

pub use plan::{Phase, PhaseState, Plan};
pub use resource::{
    Address, ArgValue, CapabilityGrant, GrantRole, Resource, ResourceId, ResourceKind,
    ResourceStatus,
};
pub use step::{GrantSpec, ResolvedAction, Step, StepAction, StepId, StepKind, StepOutput};
