//! Deployment ledger abstraction.
//!
//! The ledger is the single source of truth for resume decisions: a step is
//! re-executed only if no Success entry with a matching input hash exists for
//! its id. Implementations live in the `provisor-stores` crate.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{StepId, StepOutput};

/// Ledger access errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The persisted ledger could not be parsed. Fatal: the engine refuses
    /// to guess partial completion.
    #[error("ledger corrupted: {0}")]
    Corrupted(String),

    #[error("ledger IO error: {0}")]
    Io(String),

    #[error("ledger serialization error: {0}")]
    Serialization(String),
}

/// Outcome recorded for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Success,
    Failed,
}

/// Durable record of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub step_id: StepId,
    pub input_hash: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepOutput>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn success(step_id: StepId, input_hash: impl Into<String>, result: StepOutput) -> Self {
        Self {
            step_id,
            input_hash: input_hash.into(),
            status: EntryStatus::Success,
            result: Some(result),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(step_id: StepId, input_hash: impl Into<String>) -> Self {
        Self {
            step_id,
            input_hash: input_hash.into(),
            status: EntryStatus::Failed,
            result: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EntryStatus::Success
    }
}

/// Durable, append-only record of completed steps.
///
/// `persist` is called by the engine after every step, never batched, so a
/// crash loses at most the in-flight step's result.
#[async_trait]
pub trait DeploymentLedger: Send + Sync {
    /// True if a Success entry exists for this step with a matching hash.
    async fn has_completed(&self, step_id: &StepId, input_hash: &str) -> Result<bool, LedgerError>;

    /// Latest entry for a step, if any.
    async fn entry(&self, step_id: &StepId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Record an entry. A later entry for the same step replaces the earlier
    /// one (a Failed entry is superseded on successful re-run).
    async fn record(&self, entry: LedgerEntry) -> Result<(), LedgerError>;

    /// All entries keyed by step id. An empty ledger means "nothing
    /// completed".
    async fn load(&self) -> Result<HashMap<StepId, LedgerEntry>, LedgerError>;

    /// Flush to durable storage.
    async fn persist(&self) -> Result<(), LedgerError>;
}
