//! Phase and Plan definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CapabilityGrant, Resource, ResourceId, Step, StepAction, StepId};

/// Per-phase execution state machine.
///
/// `NotStarted -> Running -> {Completed, Aborted}`; the engine never skips
/// a state and never leaves a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

impl PhaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseState::Completed | PhaseState::Aborted)
    }
}

/// An ordered group of steps representing one logical stage.
///
/// Declared step order is a valid topological order of the phase's internal
/// dependencies; the builder rejects plans where it is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub steps: Vec<Step>,
}

/// The full validated Phase/Step graph for one run. Built once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Resources declared by this plan, keyed by id.
    pub resources: BTreeMap<ResourceId, Resource>,
    pub phases: Vec<Phase>,
}

impl Plan {
    /// Total number of steps across all phases.
    pub fn step_count(&self) -> usize {
        self.phases.iter().map(|p| p.steps.len()).sum()
    }

    /// Iterate steps in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.phases.iter().flat_map(|p| p.steps.iter())
    }

    pub fn get_step(&self, id: &StepId) -> Option<&Step> {
        self.steps().find(|s| &s.id == id)
    }

    /// The full declared capability-grant edge set.
    ///
    /// After a successful run the realized grants must equal exactly this
    /// set.
    pub fn declared_grants(&self) -> Vec<CapabilityGrant> {
        self.steps()
            .filter_map(|step| match &step.action {
                StepAction::Configure {
                    resource,
                    grant: Some(spec),
                    ..
                } => Some(CapabilityGrant {
                    grantor: resource.clone(),
                    grantee: spec.grantee.clone(),
                    role: spec.role,
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GrantRole, GrantSpec, ResourceStatus, StepKind};

    fn provision(phase: usize, index: usize, resource: &str) -> Step {
        let resource = ResourceId::from(resource);
        Step {
            id: StepId::derive(phase, index, StepKind::Provision, &resource),
            action: StepAction::Provision { resource },
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn declared_grants_collects_configure_edges() {
        let grant_step = Step {
            id: StepId::from("p01.s02.configure.vault"),
            action: StepAction::Configure {
                resource: "vault".into(),
                method: "addRouter".to_string(),
                args: Vec::new(),
                grant: Some(GrantSpec::new("router", GrantRole::Router)),
            },
            depends_on: Vec::new(),
        };
        let mut resources = BTreeMap::new();
        for id in ["vault", "router"] {
            resources.insert(
                ResourceId::from(id),
                Resource::new(id, "Contract"),
            );
        }
        let plan = Plan {
            resources,
            phases: vec![Phase {
                name: "core".to_string(),
                steps: vec![provision(1, 0, "vault"), provision(1, 1, "router"), grant_step],
            }],
        };

        assert_eq!(plan.step_count(), 3);
        let grants = plan.declared_grants();
        assert_eq!(
            grants,
            vec![CapabilityGrant::new("vault", "router", GrantRole::Router)]
        );
        assert_eq!(
            plan.resources[&ResourceId::from("vault")].status,
            ResourceStatus::Pending
        );
    }

    #[test]
    fn phase_state_terminality() {
        assert!(!PhaseState::NotStarted.is_terminal());
        assert!(!PhaseState::Running.is_terminal());
        assert!(PhaseState::Completed.is_terminal());
        assert!(PhaseState::Aborted.is_terminal());
    }
}
