//! JSON file ledger.
//!
//! One JSON document on disk holds the whole ledger. A missing file is an
//! empty ledger; a file that exists but does not parse is fatal, because
//! guessing which steps completed could repeat side-effecting operations.
//! Writes go through a temp file and rename so a crash mid-persist leaves
//! the previous document intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use provisor_core::ledger::{DeploymentLedger, LedgerEntry, LedgerError};
use provisor_core::types::StepId;

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    entries: Vec<LedgerEntry>,
}

#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    entries: RwLock<HashMap<StepId, LedgerEntry>>,
}

impl JsonFileLedger {
    /// Open the ledger at `path`, reading any existing document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let entries = read_document(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "ledger opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_document(path: &Path) -> Result<HashMap<StepId, LedgerEntry>, LedgerError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(HashMap::new());
        }
        Err(err) => return Err(LedgerError::Io(err.to_string())),
    };
    let document: LedgerDocument =
        serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupted(e.to_string()))?;
    if document.version != LEDGER_VERSION {
        return Err(LedgerError::Corrupted(format!(
            "unsupported ledger version {}",
            document.version
        )));
    }
    Ok(document
        .entries
        .into_iter()
        .map(|entry| (entry.step_id.clone(), entry))
        .collect())
}

#[async_trait]
impl DeploymentLedger for JsonFileLedger {
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
        let document = {
            let entries = self
                .entries
                .read()
                .map_err(|e| LedgerError::Io(e.to_string()))?;
            let mut list: Vec<LedgerEntry> = entries.values().cloned().collect();
            // Stable on-disk order keeps documents diffable.
            list.sort_by(|a, b| a.step_id.cmp(&b.step_id));
            LedgerDocument {
                version: LEDGER_VERSION,
                entries: list,
            }
        };

        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisor_core::types::{Address, StepOutput};

    fn address() -> Address {
        Address::from("0x00000000000000000000000000000000000000aa")
    }

    #[test]
    fn missing_file_is_an_empty_ledger() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let ledger = JsonFileLedger::open(dir.path().join("ledger.json")).unwrap();
            assert!(ledger.load().await.unwrap().is_empty());
        });
    }

    #[test]
    fn entries_survive_reopen() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ledger.json");

            let ledger = JsonFileLedger::open(&path).unwrap();
            let id = StepId::from("p01.s01.provision.vault");
            ledger
                .record(LedgerEntry::success(
                    id.clone(),
                    "abc",
                    StepOutput::Address(address()),
                ))
                .await
                .unwrap();
            ledger.persist().await.unwrap();

            let reopened = JsonFileLedger::open(&path).unwrap();
            assert!(reopened.has_completed(&id, "abc").await.unwrap());
            let entry = reopened.entry(&id).await.unwrap().expect("entry survives");
            assert_eq!(
                entry.result.and_then(|r| r.as_address().cloned()),
                Some(address())
            );
        });
    }

    #[test]
    fn corrupted_document_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"{ not json").unwrap();
        match JsonFileLedger::open(&path) {
            Err(LedgerError::Corrupted(_)) => {}
            other => panic!("expected corruption error, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, br#"{"version": 99, "entries": []}"#).unwrap();
        assert!(matches!(
            JsonFileLedger::open(&path),
            Err(LedgerError::Corrupted(_))
        ));
    }

    #[test]
    fn persist_is_atomic_replacement() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ledger.json");

            let ledger = JsonFileLedger::open(&path).unwrap();
            ledger
                .record(LedgerEntry::failed(
                    StepId::from("p02.s15.configure.vault"),
                    "abc",
                ))
                .await
                .unwrap();
            ledger.persist().await.unwrap();
            ledger.persist().await.unwrap();

            // No temp file left behind after persisting.
            assert!(!path.with_extension("tmp").exists());
            assert!(path.exists());
        });
    }
}
