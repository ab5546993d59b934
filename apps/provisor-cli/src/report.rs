//! Run summary rendering.
//!
//! The summary is the run's durable artifact for humans: every resource's
//! final address and every capability edge that now exists, in one JSON
//! document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use provisor_config::DeployConfig;
use provisor_core::engine::RunOutcome;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub project: String,
    pub network: NetworkSummary,
    pub executed: usize,
    pub skipped: usize,
    /// Resource id -> assigned address.
    pub resources: BTreeMap<String, String>,
    pub grants: Vec<GrantEdge>,
}

#[derive(Debug, Serialize)]
pub struct NetworkSummary {
    pub name: String,
    pub chain_id: u64,
}

#[derive(Debug, Serialize)]
pub struct GrantEdge {
    pub grantor: String,
    pub grantee: String,
    pub role: String,
}

impl RunSummary {
    pub fn from_outcome(config: &DeployConfig, outcome: &RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id.clone(),
            generated_at: Utc::now(),
            project: config.project.name.clone(),
            network: NetworkSummary {
                name: config.network.name.clone(),
                chain_id: config.network.chain_id,
            },
            executed: outcome.executed,
            skipped: outcome.skipped,
            resources: outcome
                .addresses()
                .map(|(id, address)| (id.to_string(), address.to_string()))
                .collect(),
            grants: outcome
                .grants
                .iter()
                .map(|grant| GrantEdge {
                    grantor: grant.grantor.to_string(),
                    grantee: grant.grantee.to_string(),
                    role: grant.role.to_string(),
                })
                .collect(),
        }
    }
}
