//! # Provisor Core
//!
//! Core abstractions and deterministic logic for the provisioning engine.
//!
//! This crate contains:
//! - Resource / Plan / Step / Grant definitions
//! - The PlanBuilder, the built-in deployment blueprint, and plan validation
//! - The orchestration engine, step executor, and retry policy
//! - The `ResourceBackend` and `DeploymentLedger` trait seams
//!
//! This crate does NOT care about:
//! - How the ledger is stored (see `provisor-stores`)
//! - What the backend actually talks to
//! - How progress is displayed

pub mod backend;
pub mod engine;
pub mod events;
pub mod executor;
pub mod hash;
pub mod ledger;
pub mod planner;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{BackendError, ResourceBackend};
    pub use crate::engine::{EngineError, OrchestrationEngine, RunOutcome};
    pub use crate::events::{RunReporter, StepEvent, StepStatus};
    pub use crate::executor::{RetryPolicy, StepError, StepExecutor};
    pub use crate::hash::input_hash;
    pub use crate::ledger::{DeploymentLedger, EntryStatus, LedgerEntry, LedgerError};
    pub use crate::planner::{PhaseSpec, PlanBuilder, PlanError, PlanSpec, StepRef, StepSpec};
    pub use crate::types::{
        Address, ArgValue, CapabilityGrant, GrantRole, Phase, PhaseState, Plan, ResolvedAction,
        Resource, ResourceId, ResourceKind, ResourceStatus, Step, StepAction, StepId, StepKind,
        StepOutput,
    };
}

// Re-export key types at crate root
pub use backend::{BackendError, ResourceBackend};
pub use engine::{EngineError, OrchestrationEngine, RunOutcome};
pub use events::{RunReporter, StepEvent, StepStatus};
pub use executor::{RetryPolicy, StepExecutor};
pub use hash::input_hash;
pub use ledger::{DeploymentLedger, LedgerEntry, LedgerError};
pub use planner::{PlanBuilder, PlanError};
pub use types::{Plan, Resource, ResourceId, Step, StepId};
