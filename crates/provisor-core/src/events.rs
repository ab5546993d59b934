//! Engine events and the reporter sink.
//!
//! The engine's only obligation to reporting collaborators is a structured
//! event per step; display and persistence are theirs.

use async_trait::async_trait;
use serde::Serialize;

use crate::types::{StepId, StepKind, StepOutput};

/// Step outcome as seen by reporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    /// Completed in a previous run; restored from the ledger.
    Skipped,
    Completed,
    Failed,
}

/// Structured per-step event.
#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    pub step_id: StepId,
    pub kind: StepKind,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepEvent {
    pub fn new(step_id: StepId, kind: StepKind, status: StepStatus) -> Self {
        Self {
            step_id,
            kind,
            status,
            output: None,
            error: None,
        }
    }

    pub fn with_output(mut self, output: StepOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Sink interface for run reporting.
#[async_trait]
pub trait RunReporter: Send + Sync {
    async fn report(&self, event: StepEvent) -> Result<(), String>;
}
