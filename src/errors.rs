//! Typed error hierarchy for the pipeline orchestration engine.
//!
//! `PipelineError` covers the conditions the controller and escalation
//! handler surface to callers. Stage-local failures (a stage reporting
//! `Failed`, a missing registration, a missing required input) are *not*
//! errors; they are recorded in `StageState.error` and end the pipeline
//! in `Failed` status.

use thiserror::Error;

use crate::escalation::EscalationStatus;
use crate::pipeline::PipelineStatus;

/// Errors surfaced by the pipeline controller, store, and escalation handler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline {id} not found")]
    PipelineNotFound { id: String },

    #[error("Escalation {id} not found")]
    EscalationNotFound { id: String },

    #[error("Cannot {action} pipeline {id} in status {status:?}")]
    InvalidTransition {
        id: String,
        status: PipelineStatus,
        action: &'static str,
    },

    #[error("Pipeline {id} has {count} pending escalation(s); resolve them via approve/reject")]
    PendingEscalations { id: String, count: usize },

    #[error("Escalation {id} is {status:?}, not pending")]
    EscalationNotPending {
        id: String,
        status: EscalationStatus,
    },

    #[error("Unknown pipeline template '{name}'")]
    UnknownTemplate { name: String },

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode or decode persisted state: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
