//! Single-step execution with bounded retry.
//!
//! The executor owns the transient/fatal distinction: transient backend
//! failures are retried with exponential backoff up to the attempt budget,
//! fatal ones surface immediately. It never touches the ledger; the engine
//! records outcomes.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::backend::{BackendError, ResourceBackend};
use crate::types::{ResolvedAction, StepId, StepOutput};

/// Retry budget and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base doubled per retry, capped at max.
    pub fn backoff(&self, retries_used: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        if base_ms == 0 {
            return Duration::from_millis(0);
        }
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let shift = retries_used.min(20);
        let multiplier = 1u128 << shift;
        let backoff_ms = base_ms.saturating_mul(multiplier).min(max_ms);
        Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
    }
}

/// Terminal failure of one step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{message} (retry exhausted after {attempts} attempt(s))")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("{0}")]
    Fatal(String),
}

/// Executes one resolved action against the backend.
pub struct StepExecutor {
    policy: RetryPolicy,
}

impl StepExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run the action to completion or terminal failure.
    pub async fn execute(
        &self,
        step_id: &StepId,
        action: &ResolvedAction,
        backend: &dyn ResourceBackend,
    ) -> Result<StepOutput, StepError> {
        let mut retries_used: u32 = 0;

        loop {
            let result = self.attempt(action, backend).await;
            let err = match result {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(StepError::Fatal(err.to_string()));
            }
            if retries_used + 1 >= self.policy.max_attempts {
                return Err(StepError::RetriesExhausted {
                    attempts: retries_used + 1,
                    message: err.to_string(),
                });
            }

            let delay = self.policy.backoff(retries_used);
            retries_used += 1;
            warn!(
                step_id = %step_id,
                error = %err,
                retry_attempt = retries_used,
                retry_in_ms = delay.as_millis() as u64,
                "retrying step after transient failure"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    async fn attempt(
        &self,
        action: &ResolvedAction,
        backend: &dyn ResourceBackend,
    ) -> Result<StepOutput, BackendError> {
        match action {
            ResolvedAction::Provision { kind, args } => {
                let address = backend.create(kind, args).await?;
                Ok(StepOutput::Address(address))
            }
            ResolvedAction::Configure {
                target,
                method,
                args,
            } => {
                let receipt = backend.invoke(target, method, args).await?;
                Ok(StepOutput::Receipt(receipt))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ArgValue, ResourceKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend that fails transiently a fixed number of times, then succeeds.
    struct FlakyBackend {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResourceBackend for FlakyBackend {
        async fn create(
            &self,
            _kind: &ResourceKind,
            _args: &[ArgValue],
        ) -> Result<Address, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(BackendError::Transient("connection reset".to_string()))
            } else {
                Ok(Address::from("0x00000000000000000000000000000000000000aa"))
            }
        }

        async fn invoke(
            &self,
            _target: &Address,
            _method: &str,
            _args: &[ArgValue],
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Fatal("method reverted".to_string()))
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    fn provision() -> ResolvedAction {
        ResolvedAction::Provision {
            kind: ResourceKind::from("Vault"),
            args: Vec::new(),
        }
    }

    #[test]
    fn transient_failures_are_retried_to_success() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let backend = FlakyBackend {
                failures: 2,
                calls: calls.clone(),
            };
            let executor = StepExecutor::new(fast_policy());
            let output = executor
                .execute(&StepId::from("p01.s01.provision.vault"), &provision(), &backend)
                .await
                .expect("third attempt succeeds");
            assert!(output.as_address().is_some());
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        });
    }

    #[test]
    fn retry_budget_is_exhausted_after_three_attempts() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let backend = FlakyBackend {
                failures: usize::MAX,
                calls: calls.clone(),
            };
            let executor = StepExecutor::new(fast_policy());
            let err = executor
                .execute(&StepId::from("p01.s01.provision.vault"), &provision(), &backend)
                .await
                .expect_err("never succeeds");
            assert!(matches!(err, StepError::RetriesExhausted { attempts: 3, .. }));
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        });
    }

    #[test]
    fn fatal_failures_are_not_retried() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let backend = FlakyBackend {
                failures: 0,
                calls: calls.clone(),
            };
            let executor = StepExecutor::new(fast_policy());
            let action = ResolvedAction::Configure {
                target: Address::from("0x00000000000000000000000000000000000000aa"),
                method: "setUsdg".to_string(),
                args: Vec::new(),
            };
            let err = executor
                .execute(&StepId::from("p02.s15.configure.vault"), &action, &backend)
                .await
                .expect_err("fatal");
            assert!(matches!(err, StepError::Fatal(_)));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(2), Duration::from_millis(800));
        assert_eq!(policy.backoff(3), Duration::from_millis(1000));
    }
}
