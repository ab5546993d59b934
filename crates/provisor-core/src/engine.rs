//! The orchestration engine.
//!
//! Walks a validated Plan phase by phase, step by step, in declared order.
//! Before each step it consults the ledger; a matching Success entry means
//! the step is skipped and its output restored. After each executed step the
//! ledger is persisted, so a crash at any point loses at most the in-flight
//! step. The first terminal step failure aborts the current phase and the
//! run; nothing after it executes.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::ResourceBackend;
use crate::events::{RunReporter, StepEvent, StepStatus};
use crate::executor::{RetryPolicy, StepError, StepExecutor};
use crate::hash::input_hash;
use crate::ledger::{DeploymentLedger, LedgerEntry, LedgerError};
use crate::types::{
    Address, ArgValue, CapabilityGrant, PhaseState, Plan, ResolvedAction, Resource, ResourceId,
    ResourceStatus, Step, StepAction, StepId, StepOutput,
};

/// Run-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A step's arguments reference a resource with no known address. The
    /// planner prevents this for well-formed plans; hitting it at run time
    /// means the plan and ledger disagree.
    #[error("step '{step}' references resource '{resource}' with no resolved address")]
    UnresolvedDependency { step: StepId, resource: ResourceId },

    #[error("step '{step_id}' failed in phase '{phase}': {source}")]
    Step {
        step_id: StepId,
        phase: String,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("run cancelled before step '{next_step}'")]
    Cancelled { next_step: StepId },
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Final state of every plan resource, addresses and statuses filled in.
    pub resources: BTreeMap<ResourceId, Resource>,
    /// Grants realized by this run, including ones restored from the ledger.
    pub grants: Vec<CapabilityGrant>,
    pub phase_states: Vec<(String, PhaseState)>,
    pub executed: usize,
    pub skipped: usize,
}

impl RunOutcome {
    /// Provisioned resources and their assigned addresses.
    pub fn addresses(&self) -> impl Iterator<Item = (&ResourceId, &Address)> {
        self.resources
            .iter()
            .filter_map(|(id, resource)| resource.address.as_ref().map(|a| (id, a)))
    }
}

/// Drives a Plan to completion against a backend, ledger, and reporter.
pub struct OrchestrationEngine {
    ledger: Arc<dyn DeploymentLedger>,
    backend: Arc<dyn ResourceBackend>,
    executor: StepExecutor,
    reporter: Option<Arc<dyn RunReporter>>,
    cancel: CancellationToken,
}

impl OrchestrationEngine {
    pub fn new(ledger: Arc<dyn DeploymentLedger>, backend: Arc<dyn ResourceBackend>) -> Self {
        Self {
            ledger,
            backend,
            executor: StepExecutor::new(RetryPolicy::default()),
            reporter: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.executor = StepExecutor::new(policy);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute the plan. Sequential by design: backend operations have
    /// side effects whose order the plan's dependencies encode.
    pub async fn run(&self, plan: &Plan) -> Result<RunOutcome, EngineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, steps = plan.step_count(), "run started");

        // Working copy; the plan itself stays immutable.
        let mut resources = plan.resources.clone();
        let mut grants: Vec<CapabilityGrant> = Vec::new();
        let mut phase_states: Vec<(String, PhaseState)> = plan
            .phases
            .iter()
            .map(|p| (p.name.clone(), PhaseState::NotStarted))
            .collect();
        let mut executed = 0usize;
        let mut skipped = 0usize;

        for (phase_idx, phase) in plan.phases.iter().enumerate() {
            phase_states[phase_idx].1 = PhaseState::Running;
            info!(phase = %phase.name, steps = phase.steps.len(), "phase started");

            for step in &phase.steps {
                // Cancellation is honored only between steps; an in-flight
                // backend call always runs to completion or failure.
                if self.cancel.is_cancelled() {
                    phase_states[phase_idx].1 = PhaseState::Aborted;
                    info!(phase = %phase.name, step_id = %step.id, "run cancelled");
                    return Err(EngineError::Cancelled {
                        next_step: step.id.clone(),
                    });
                }

                let resolved = resolve_action(step, &resources)?;
                let hash = input_hash(&resolved);

                if self.ledger.has_completed(&step.id, &hash).await? {
                    self.restore_step(step, &mut resources, &mut grants).await?;
                    skipped += 1;
                    debug!(step_id = %step.id, "step restored from ledger");
                    self.report(
                        StepEvent::new(step.id.clone(), step.kind(), StepStatus::Skipped),
                    )
                    .await;
                    continue;
                }

                self.report(StepEvent::new(step.id.clone(), step.kind(), StepStatus::Started))
                    .await;

                match self
                    .executor
                    .execute(&step.id, &resolved, self.backend.as_ref())
                    .await
                {
                    Ok(output) => {
                        self.ledger
                            .record(LedgerEntry::success(step.id.clone(), &hash, output.clone()))
                            .await?;
                        self.ledger.persist().await?;
                        apply_output(step, &output, &mut resources, &mut grants);
                        executed += 1;
                        info!(step_id = %step.id, phase = %phase.name, "step completed");
                        self.report(
                            StepEvent::new(step.id.clone(), step.kind(), StepStatus::Completed)
                                .with_output(output),
                        )
                        .await;
                    }
                    Err(step_err) => {
                        self.ledger
                            .record(LedgerEntry::failed(step.id.clone(), &hash))
                            .await?;
                        self.ledger.persist().await?;
                        if let StepAction::Provision { resource } = &step.action {
                            if let Some(decl) = resources.get_mut(resource) {
                                decl.status = ResourceStatus::Failed;
                            }
                        }
                        phase_states[phase_idx].1 = PhaseState::Aborted;
                        error!(
                            step_id = %step.id,
                            phase = %phase.name,
                            error = %step_err,
                            "step failed; aborting run"
                        );
                        self.report(
                            StepEvent::new(step.id.clone(), step.kind(), StepStatus::Failed)
                                .with_error(step_err.to_string()),
                        )
                        .await;
                        return Err(EngineError::Step {
                            step_id: step.id.clone(),
                            phase: phase.name.clone(),
                            source: step_err,
                        });
                    }
                }
            }

            phase_states[phase_idx].1 = PhaseState::Completed;
            info!(phase = %phase.name, "phase completed");
        }

        info!(run_id = %run_id, executed, skipped, "run completed");
        Ok(RunOutcome {
            run_id,
            resources,
            grants,
            phase_states,
            executed,
            skipped,
        })
    }

    /// Re-apply the recorded output of a previously completed step so that
    /// later steps resolve against the same addresses, and so the realized
    /// grant set stays complete across resumed runs.
    async fn restore_step(
        &self,
        step: &Step,
        resources: &mut BTreeMap<ResourceId, Resource>,
        grants: &mut Vec<CapabilityGrant>,
    ) -> Result<(), EngineError> {
        let entry = self.ledger.entry(&step.id).await?;
        if let Some(output) = entry.and_then(|e| e.result) {
            apply_output(step, &output, resources, grants);
        }
        Ok(())
    }

    async fn report(&self, event: StepEvent) {
        if let Some(reporter) = &self.reporter {
            if let Err(message) = reporter.report(event).await {
                warn!(error = %message, "reporter failed");
            }
        }
    }
}

/// Fold one step's output into the run state.
fn apply_output(
    step: &Step,
    output: &StepOutput,
    resources: &mut BTreeMap<ResourceId, Resource>,
    grants: &mut Vec<CapabilityGrant>,
) {
    match &step.action {
        StepAction::Provision { resource } => {
            if let (Some(address), Some(decl)) = (output.as_address(), resources.get_mut(resource))
            {
                decl.address = Some(address.clone());
                decl.status = ResourceStatus::Provisioned;
            }
        }
        StepAction::Configure {
            resource, grant, ..
        } => {
            if let Some(spec) = grant {
                grants.push(CapabilityGrant::new(
                    resource.clone(),
                    spec.grantee.clone(),
                    spec.role,
                ));
            }
        }
    }
}

fn address_of<'a>(
    resources: &'a BTreeMap<ResourceId, Resource>,
    id: &ResourceId,
) -> Option<&'a Address> {
    resources.get(id).and_then(|r| r.address.as_ref())
}

/// Substitute resource references with concrete addresses.
fn resolve_action(
    step: &Step,
    resources: &BTreeMap<ResourceId, Resource>,
) -> Result<ResolvedAction, EngineError> {
    match &step.action {
        StepAction::Provision { resource } => {
            let decl = resources
                .get(resource)
                .ok_or_else(|| EngineError::UnresolvedDependency {
                    step: step.id.clone(),
                    resource: resource.clone(),
                })?;
            let args = decl
                .constructor_args
                .iter()
                .map(|arg| resolve_arg(&step.id, arg, resources))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ResolvedAction::Provision {
                kind: decl.kind.clone(),
                args,
            })
        }
        StepAction::Configure {
            resource,
            method,
            args,
            ..
        } => {
            let target = address_of(resources, resource)
                .ok_or_else(|| EngineError::UnresolvedDependency {
                    step: step.id.clone(),
                    resource: resource.clone(),
                })?
                .clone();
            let args = args
                .iter()
                .map(|arg| resolve_arg(&step.id, arg, resources))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ResolvedAction::Configure {
                target,
                method: method.clone(),
                args,
            })
        }
    }
}

fn resolve_arg(
    step_id: &StepId,
    arg: &ArgValue,
    resources: &BTreeMap<ResourceId, Resource>,
) -> Result<ArgValue, EngineError> {
    match arg {
        ArgValue::ResourceRef(resource) => address_of(resources, resource)
            .map(|address| ArgValue::Address(address.clone()))
            .ok_or_else(|| EngineError::UnresolvedDependency {
                step: step_id.clone(),
                resource: resource.clone(),
            }),
        ArgValue::List(items) => items
            .iter()
            .map(|item| resolve_arg(step_id, item, resources))
            .collect::<Result<Vec<_>, _>>()
            .map(ArgValue::List),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::ledger::{EntryStatus, LedgerEntry};
    use crate::planner::PlanBuilder;
    use crate::types::ResourceKind;
    use async_trait::async_trait;
    use provisor_config::DeployConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory ledger for engine tests; the durable implementations live
    /// in the stores crate.
    #[derive(Default)]
    struct MemoryLedger {
        entries: Mutex<HashMap<StepId, LedgerEntry>>,
        persist_calls: AtomicUsize,
    }

    #[async_trait]
    impl DeploymentLedger for MemoryLedger {
        async fn has_completed(
            &self,
            step_id: &StepId,
            input_hash: &str,
        ) -> Result<bool, LedgerError> {
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(step_id)
                .map(|e| e.is_success() && e.input_hash == input_hash)
                .unwrap_or(false))
        }

        async fn entry(&self, step_id: &StepId) -> Result<Option<LedgerEntry>, LedgerError> {
            Ok(self.entries.lock().unwrap().get(step_id).cloned())
        }

        async fn record(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
            self.entries
                .lock()
                .unwrap()
                .insert(entry.step_id.clone(), entry);
            Ok(())
        }

        async fn load(&self) -> Result<HashMap<StepId, LedgerEntry>, LedgerError> {
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn persist(&self) -> Result<(), LedgerError> {
            self.persist_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Backend producing deterministic addresses; optionally fails fatally
    /// on its nth call (1-based).
    struct CountingBackend {
        calls: AtomicUsize,
        fail_at: Option<usize>,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_at: None,
            }
        }

        fn failing_at(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_at: Some(call),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<usize, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_at == Some(n) {
                Err(BackendError::Fatal("backend rejected the call".to_string()))
            } else {
                Ok(n)
            }
        }
    }

    #[async_trait]
    impl ResourceBackend for CountingBackend {
        async fn create(
            &self,
            _kind: &ResourceKind,
            _args: &[ArgValue],
        ) -> Result<Address, BackendError> {
            let n = self.next()?;
            Ok(Address::from(format!("0x{n:040x}").as_str()))
        }

        async fn invoke(
            &self,
            _target: &Address,
            method: &str,
            _args: &[ArgValue],
        ) -> Result<String, BackendError> {
            let n = self.next()?;
            Ok(format!("{method}#{n}"))
        }
    }

    fn plan() -> Plan {
        PlanBuilder::build(&DeployConfig::example()).expect("blueprint builds")
    }

    fn engine(ledger: Arc<MemoryLedger>, backend: Arc<CountingBackend>) -> OrchestrationEngine {
        OrchestrationEngine::new(ledger, backend)
    }

    #[test]
    fn fresh_run_executes_every_step() {
        tokio_test::block_on(async {
            let plan = plan();
            let ledger = Arc::new(MemoryLedger::default());
            let backend = Arc::new(CountingBackend::new());
            let outcome = engine(ledger.clone(), backend.clone())
                .run(&plan)
                .await
                .expect("run succeeds");

            assert_eq!(outcome.executed, plan.step_count());
            assert_eq!(outcome.skipped, 0);
            assert_eq!(backend.call_count(), plan.step_count());
            assert_eq!(outcome.addresses().count(), plan.resources.len());
            assert!(outcome
                .resources
                .values()
                .all(|r| r.status == ResourceStatus::Provisioned));
            assert!(outcome
                .phase_states
                .iter()
                .all(|(_, state)| *state == PhaseState::Completed));
            // Ledger persisted once per executed step.
            assert_eq!(
                ledger.persist_calls.load(Ordering::SeqCst),
                plan.step_count()
            );
        });
    }

    #[test]
    fn second_run_skips_everything_and_keeps_grants() {
        tokio_test::block_on(async {
            let plan = plan();
            let ledger = Arc::new(MemoryLedger::default());
            let first = Arc::new(CountingBackend::new());
            engine(ledger.clone(), first).run(&plan).await.expect("first run");

            let second = Arc::new(CountingBackend::new());
            let outcome = engine(ledger, second.clone())
                .run(&plan)
                .await
                .expect("second run");

            assert_eq!(second.call_count(), 0);
            assert_eq!(outcome.executed, 0);
            assert_eq!(outcome.skipped, plan.step_count());
            // Skipped grant steps still contribute to the realized set.
            assert_eq!(outcome.grants, plan.declared_grants());
            assert_eq!(outcome.addresses().count(), plan.resources.len());
        });
    }

    #[test]
    fn failure_aborts_run_and_records_failed_entry() {
        tokio_test::block_on(async {
            let plan = plan();
            let ledger = Arc::new(MemoryLedger::default());
            let backend = Arc::new(CountingBackend::failing_at(10));
            let err = engine(ledger.clone(), backend.clone())
                .run(&plan)
                .await
                .expect_err("run fails");

            let EngineError::Step { step_id, .. } = err else {
                panic!("expected step failure");
            };
            let entry = ledger.entry(&step_id).await.unwrap().expect("entry recorded");
            assert_eq!(entry.status, EntryStatus::Failed);
            // Nothing after the failing step ran.
            assert_eq!(backend.call_count(), 10);
        });
    }

    #[test]
    fn resume_after_failure_reruns_only_the_remainder() {
        tokio_test::block_on(async {
            let plan = plan();
            let total = plan.step_count();
            let ledger = Arc::new(MemoryLedger::default());

            let flaky = Arc::new(CountingBackend::failing_at(10));
            engine(ledger.clone(), flaky).run(&plan).await.expect_err("first run fails");

            let steady = Arc::new(CountingBackend::new());
            let outcome = engine(ledger, steady.clone())
                .run(&plan)
                .await
                .expect("resume succeeds");

            // Nine steps completed before the failure; they are skipped now.
            assert_eq!(outcome.skipped, 9);
            assert_eq!(outcome.executed, total - 9);
            assert_eq!(steady.call_count(), total - 9);
        });
    }

    /// Backend whose `initialize` invocations always fail transiently.
    struct InitializeFlakyBackend {
        inner: CountingBackend,
    }

    #[async_trait]
    impl ResourceBackend for InitializeFlakyBackend {
        async fn create(
            &self,
            kind: &ResourceKind,
            args: &[ArgValue],
        ) -> Result<Address, BackendError> {
            self.inner.create(kind, args).await
        }

        async fn invoke(
            &self,
            target: &Address,
            method: &str,
            args: &[ArgValue],
        ) -> Result<String, BackendError> {
            if method == "initialize" {
                return Err(BackendError::Transient("deadline exceeded".to_string()));
            }
            self.inner.invoke(target, method, args).await
        }
    }

    #[test]
    fn transient_exhaustion_mid_phase_resumes_cleanly() {
        tokio_test::block_on(async {
            let plan = plan();
            let total = plan.step_count();
            let ledger = Arc::new(MemoryLedger::default());

            // First run dies on the staked tracker's initialize call after
            // exhausting retries.
            let flaky = Arc::new(InitializeFlakyBackend {
                inner: CountingBackend::new(),
            });
            let policy = RetryPolicy {
                max_attempts: 3,
                base_delay: std::time::Duration::from_millis(0),
                max_delay: std::time::Duration::from_millis(0),
            };
            let err = OrchestrationEngine::new(ledger.clone(), flaky.clone())
                .with_retry_policy(policy)
                .run(&plan)
                .await
                .expect_err("initialize never succeeds");
            let EngineError::Step { step_id, source, .. } = err else {
                panic!("expected step failure");
            };
            assert!(step_id.as_str().ends_with("configure.stakedTracker"));
            assert!(matches!(source, StepError::RetriesExhausted { .. }));

            let completed_before = ledger
                .load()
                .await
                .unwrap()
                .values()
                .filter(|e| e.is_success())
                .count();

            // Resume: completed steps are skipped, no resource is created
            // twice, and the run finishes.
            let steady = Arc::new(CountingBackend::new());
            let outcome = engine(ledger.clone(), steady.clone())
                .run(&plan)
                .await
                .expect("resume succeeds");
            assert_eq!(outcome.skipped, completed_before);
            assert_eq!(outcome.executed, total - completed_before);
            assert_eq!(steady.call_count(), total - completed_before);
            let success_entries = ledger
                .load()
                .await
                .unwrap()
                .values()
                .filter(|e| e.is_success())
                .count();
            assert_eq!(success_entries, total);
        });
    }

    #[test]
    fn changed_configuration_forces_reexecution_of_affected_step() {
        tokio_test::block_on(async {
            let ledger = Arc::new(MemoryLedger::default());
            let first = Arc::new(CountingBackend::new());
            engine(ledger.clone(), first)
                .run(&plan())
                .await
                .expect("first run");

            let mut config = DeployConfig::example();
            config.settings.max_leverage = 30;
            let changed = PlanBuilder::build(&config).expect("plan builds");

            let second = Arc::new(CountingBackend::new());
            let outcome = engine(ledger, second.clone())
                .run(&changed)
                .await
                .expect("second run");

            // Only the leverage step's resolved input changed.
            assert_eq!(outcome.executed, 1);
            assert_eq!(second.call_count(), 1);
            assert_eq!(outcome.skipped, changed.step_count() - 1);
        });
    }

    #[test]
    fn ledger_timestamps_respect_declared_dependencies() {
        tokio_test::block_on(async {
            let plan = plan();
            let ledger = Arc::new(MemoryLedger::default());
            let backend = Arc::new(CountingBackend::new());
            engine(ledger.clone(), backend).run(&plan).await.expect("run succeeds");

            let entries = ledger.load().await.unwrap();
            for step in plan.steps() {
                let step_entry = &entries[&step.id];
                for dep in &step.depends_on {
                    let dep_entry = &entries[dep];
                    assert!(
                        dep_entry.timestamp <= step_entry.timestamp,
                        "{dep} recorded after {}",
                        step.id
                    );
                }
            }
        });
    }

    #[test]
    fn cancellation_stops_before_the_next_step() {
        tokio_test::block_on(async {
            let plan = plan();
            let ledger = Arc::new(MemoryLedger::default());
            let backend = Arc::new(CountingBackend::new());
            let token = CancellationToken::new();
            token.cancel();

            let err = engine(ledger, backend.clone())
                .with_cancellation(token)
                .run(&plan)
                .await
                .expect_err("cancelled");

            assert!(matches!(err, EngineError::Cancelled { .. }));
            assert_eq!(backend.call_count(), 0);
        });
    }
}
