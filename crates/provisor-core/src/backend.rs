//! Resource backend abstraction.
//!
//! The backend is the engine's only door to the outside world. It exposes
//! exactly two operations and stays opaque about resource semantics; all
//! kind-specific behavior lives on the other side of this trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Address, ArgValue, ResourceKind};

/// Backend failure classification.
///
/// Transient failures (network, timeout) are eligible for bounded retry by
/// the executor; fatal ones (rejected arguments, outright refusal) are not.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("fatal backend failure: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// External capability to create resources and invoke methods on them.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Create a resource of the given kind; returns its address/handle.
    async fn create(&self, kind: &ResourceKind, args: &[ArgValue]) -> Result<Address, BackendError>;

    /// Invoke a method on a provisioned resource and wait for its
    /// completion acknowledgment; returns a receipt summary.
    async fn invoke(
        &self,
        target: &Address,
        method: &str,
        args: &[ArgValue],
    ) -> Result<String, BackendError>;
}
