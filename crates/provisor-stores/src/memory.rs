//! In-memory ledger.
//!
//! Nothing survives the process; useful for tests and dry runs where
//! durability is explicitly unwanted.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use provisor_core::ledger::{DeploymentLedger, LedgerEntry, LedgerError};
use provisor_core::types::StepId;

pub struct InMemoryLedger {
    entries: RwLock<HashMap<StepId, LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeploymentLedger for InMemoryLedger {
    async fn has_completed(&self, step_id: &StepId, input_hash: &str) -> Result<bool, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        Ok(entries
            .get(step_id)
            .map(|entry| entry.is_success() && entry.input_hash == input_hash)
            .unwrap_or(false))
    }

    async fn entry(&self, step_id: &StepId) -> Result<Option<LedgerEntry>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        Ok(entries.get(step_id).cloned())
    }

    async fn record(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        entries.insert(entry.step_id.clone(), entry);
        Ok(())
    }

    async fn load(&self) -> Result<HashMap<StepId, LedgerEntry>, LedgerError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        Ok(entries.clone())
    }

    async fn persist(&self) -> Result<(), LedgerError> {
        // Nothing durable to flush.
        Ok(())
    }
}
