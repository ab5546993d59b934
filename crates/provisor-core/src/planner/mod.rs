//! Plan building and validation.
//!
//! The PlanBuilder is the stability core of the system: it turns the
//! declarative phase/step description into a validated, deterministically
//! numbered Plan, and refuses anything whose dependency structure could
//! surprise the engine later. No side effects happen here; a plan that
//! builds is a plan the engine can walk without guessing.

pub mod blueprint;

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use provisor_config::DeployConfig;

use crate::types::{
    ArgValue, GrantRole, GrantSpec, Phase, Plan, Resource, ResourceId, Step, StepAction, StepId,
};

/// Plan validation errors. All fatal; no partial plan is ever returned.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan declares no phases")]
    EmptyPlan,

    #[error("phase '{0}' declares no steps")]
    EmptyPhase(String),

    #[error("resource '{0}' declared more than once")]
    DuplicateResource(ResourceId),

    #[error("resource '{0}' is provisioned more than once")]
    DuplicateProvision(ResourceId),

    #[error("step '{step}' references undeclared resource '{resource}'")]
    UnknownResource { step: StepId, resource: ResourceId },

    #[error("step '{step}' depends on undeclared step '{reference}'")]
    UnknownDependency { step: StepId, reference: String },

    #[error("dependency cycle involving step '{0}'")]
    Cycle(StepId),

    #[error("step '{step}' depends on later step '{dependency}'")]
    ForwardDependency { step: StepId, dependency: StepId },
}

/// Symbolic reference to a step, resolved during plan building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRef {
    /// The Provision step of a resource.
    Provision(ResourceId),
    /// The first Configure step invoking `method` on `resource`.
    Configure(ResourceId, String),
}

/// Declarative description of one step, before numbering and validation.
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub action: StepAction,
    /// Extra ordering constraints beyond those derived from arguments.
    pub after: Vec<StepRef>,
}

impl StepSpec {
    pub fn provision(resource: impl Into<ResourceId>) -> Self {
        Self {
            action: StepAction::Provision {
                resource: resource.into(),
            },
            after: Vec::new(),
        }
    }

    pub fn configure(
        resource: impl Into<ResourceId>,
        method: impl Into<String>,
        args: Vec<ArgValue>,
    ) -> Self {
        Self {
            action: StepAction::Configure {
                resource: resource.into(),
                method: method.into(),
                args,
                grant: None,
            },
            after: Vec::new(),
        }
    }

    /// A Configure step that establishes a capability grant from its target
    /// resource (the grantor) to `grantee`.
    pub fn configure_grant(
        resource: impl Into<ResourceId>,
        method: impl Into<String>,
        args: Vec<ArgValue>,
        grantee: impl Into<ResourceId>,
        role: GrantRole,
    ) -> Self {
        Self {
            action: StepAction::Configure {
                resource: resource.into(),
                method: method.into(),
                args,
                grant: Some(GrantSpec::new(grantee, role)),
            },
            after: Vec::new(),
        }
    }

    pub fn after(mut self, reference: StepRef) -> Self {
        self.after.push(reference);
        self
    }
}

/// Declarative description of one phase.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

impl PhaseSpec {
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// Full declarative input to the PlanBuilder.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub resources: Vec<Resource>,
    pub phases: Vec<PhaseSpec>,
}

/// Builds validated Plans. Pure: a function of its input only.
pub struct PlanBuilder;

impl PlanBuilder {
    /// Build the deployment plan for a validated configuration.
    pub fn build(config: &DeployConfig) -> Result<Plan, PlanError> {
        Self::from_spec(blueprint::declare(config))
    }

    /// Build and validate a Plan from a declarative spec.
    pub fn from_spec(spec: PlanSpec) -> Result<Plan, PlanError> {
        if spec.phases.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        for phase in &spec.phases {
            if phase.steps.is_empty() {
                return Err(PlanError::EmptyPhase(phase.name.clone()));
            }
        }

        let mut resources: BTreeMap<ResourceId, Resource> = BTreeMap::new();
        for resource in spec.resources {
            if resources.contains_key(&resource.id) {
                return Err(PlanError::DuplicateResource(resource.id));
            }
            resources.insert(resource.id.clone(), resource);
        }

        let numbered = number_steps(&spec.phases);

        // Resolve symbolic references and derive dependencies.
        let index = StepIndex::build(&numbered);
        let mut steps: Vec<NumberedStep> = Vec::with_capacity(numbered.len());
        for entry in numbered {
            let depends_on = derive_dependencies(&entry, &resources, &index)?;
            steps.push(NumberedStep {
                depends_on,
                ..entry
            });
        }

        // Cycle detection runs before the forward check so a genuine cycle
        // is reported as a cycle, not as its first forward edge.
        detect_cycles(&steps)?;

        let position: HashMap<&StepId, usize> =
            steps.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();
        for (pos, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                let dep_pos = position.get(dep).copied().ok_or_else(|| {
                    PlanError::UnknownDependency {
                        step: step.id.clone(),
                        reference: dep.to_string(),
                    }
                })?;
                if dep_pos >= pos {
                    return Err(PlanError::ForwardDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Assemble immutable phases.
        let mut phases: Vec<Phase> = Vec::new();
        for step in steps {
            if phases.len() < step.phase_index {
                phases.push(Phase {
                    name: step.phase_name.clone(),
                    steps: Vec::new(),
                });
            }
            let phase = phases
                .last_mut()
                .expect("phase pushed before its first step");
            phase.steps.push(Step {
                id: step.id,
                action: step.action,
                depends_on: step.depends_on,
            });
        }

        Ok(Plan { resources, phases })
    }
}

#[derive(Debug, Clone)]
struct NumberedStep {
    id: StepId,
    phase_index: usize,
    phase_name: String,
    action: StepAction,
    after: Vec<StepRef>,
    depends_on: Vec<StepId>,
}

/// Assign deterministic, stable step ids: 1-based phase and step numbering.
fn number_steps(phases: &[PhaseSpec]) -> Vec<NumberedStep> {
    let mut out = Vec::new();
    for (phase_idx, phase) in phases.iter().enumerate() {
        for (step_idx, spec) in phase.steps.iter().enumerate() {
            let kind = spec.action.kind();
            let id = StepId::derive(phase_idx + 1, step_idx + 1, kind, spec.action.resource());
            out.push(NumberedStep {
                id,
                phase_index: phase_idx + 1,
                phase_name: phase.name.clone(),
                action: spec.action.clone(),
                after: spec.after.clone(),
                depends_on: Vec::new(),
            });
        }
    }
    out
}

/// Lookup from symbolic step references to assigned ids.
struct StepIndex {
    provisions: HashMap<ResourceId, StepId>,
    configures: HashMap<(ResourceId, String), StepId>,
}

impl StepIndex {
    fn build(steps: &[NumberedStep]) -> Self {
        let mut provisions = HashMap::new();
        let mut configures = HashMap::new();
        for step in steps {
            match &step.action {
                StepAction::Provision { resource } => {
                    provisions
                        .entry(resource.clone())
                        .or_insert_with(|| step.id.clone());
                }
                StepAction::Configure {
                    resource, method, ..
                } => {
                    configures
                        .entry((resource.clone(), method.clone()))
                        .or_insert_with(|| step.id.clone());
                }
            }
        }
        Self {
            provisions,
            configures,
        }
    }

    fn provision_of(&self, resource: &ResourceId) -> Option<&StepId> {
        self.provisions.get(resource)
    }

    fn resolve(&self, reference: &StepRef) -> Option<&StepId> {
        match reference {
            StepRef::Provision(resource) => self.provisions.get(resource),
            StepRef::Configure(resource, method) => {
                self.configures.get(&(resource.clone(), method.clone()))
            }
        }
    }
}

/// Derive a step's full dependency set: target provision, argument
/// references, grantee provision, and explicit `after` constraints.
fn derive_dependencies(
    step: &NumberedStep,
    resources: &BTreeMap<ResourceId, Resource>,
    index: &StepIndex,
) -> Result<Vec<StepId>, PlanError> {
    let mut referenced: Vec<ResourceId> = Vec::new();
    match &step.action {
        StepAction::Provision { resource } => {
            let decl = resources
                .get(resource)
                .ok_or_else(|| PlanError::UnknownResource {
                    step: step.id.clone(),
                    resource: resource.clone(),
                })?;
            if index.provision_of(resource) != Some(&step.id) {
                return Err(PlanError::DuplicateProvision(resource.clone()));
            }
            for arg in &decl.constructor_args {
                arg.referenced_resources(&mut referenced);
            }
        }
        StepAction::Configure {
            resource,
            args,
            grant,
            ..
        } => {
            if !resources.contains_key(resource) {
                return Err(PlanError::UnknownResource {
                    step: step.id.clone(),
                    resource: resource.clone(),
                });
            }
            referenced.push(resource.clone());
            for arg in args {
                arg.referenced_resources(&mut referenced);
            }
            if let Some(spec) = grant {
                referenced.push(spec.grantee.clone());
            }
        }
    }

    let mut deps: Vec<StepId> = Vec::new();
    let mut seen: HashSet<StepId> = HashSet::new();
    for resource in referenced {
        let dep = index
            .provision_of(&resource)
            .ok_or_else(|| PlanError::UnknownResource {
                step: step.id.clone(),
                resource: resource.clone(),
            })?;
        if seen.insert(dep.clone()) {
            deps.push(dep.clone());
        }
    }
    for reference in &step.after {
        let dep = index
            .resolve(reference)
            .ok_or_else(|| PlanError::UnknownDependency {
                step: step.id.clone(),
                reference: format!("{reference:?}"),
            })?;
        if dep != &step.id && seen.insert(dep.clone()) {
            deps.push(dep.clone());
        }
    }
    Ok(deps)
}

/// DFS cycle detection over the derived dependency graph.
fn detect_cycles(steps: &[NumberedStep]) -> Result<(), PlanError> {
    let mut adj: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
    for step in steps {
        adj.entry(&step.id).or_default();
        for dep in &step.depends_on {
            adj.entry(dep).or_default().push(&step.id);
        }
    }

    let mut visited: HashSet<&StepId> = HashSet::new();
    let mut rec_stack: HashSet<&StepId> = HashSet::new();

    fn dfs<'a>(
        node: &'a StepId,
        adj: &HashMap<&'a StepId, Vec<&'a StepId>>,
        visited: &mut HashSet<&'a StepId>,
        rec_stack: &mut HashSet<&'a StepId>,
    ) -> Option<&'a StepId> {
        visited.insert(node);
        rec_stack.insert(node);

        if let Some(neighbors) = adj.get(node) {
            for &neighbor in neighbors {
                if !visited.contains(neighbor) {
                    if let Some(cycle_node) = dfs(neighbor, adj, visited, rec_stack) {
                        return Some(cycle_node);
                    }
                } else if rec_stack.contains(neighbor) {
                    return Some(neighbor);
                }
            }
        }

        rec_stack.remove(node);
        None
    }

    for step in steps {
        if !visited.contains(&step.id) {
            if let Some(node) = dfs(&step.id, &adj, &mut visited, &mut rec_stack) {
                return Err(PlanError::Cycle(node.clone()));
            }
        }
    }
    Ok(())
}
