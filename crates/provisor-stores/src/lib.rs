//! # Provisor Stores
//!
//! Ledger implementations for the provisioning engine.
//!
//! This crate provides:
//! - InMemory DeploymentLedger (tests, dry runs)
//! - JSON file DeploymentLedger (the durable default)

mod json_file;
mod memory;

pub use json_file::JsonFileLedger;
pub use memory::InMemoryLedger;

// Re-export core traits for convenience
pub use provisor_core::ledger::{DeploymentLedger, EntryStatus, LedgerEntry, LedgerError};
