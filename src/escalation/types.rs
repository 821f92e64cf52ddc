//! Escalation entity: a suspend-and-ask-a-human event raised by a stage.
//!
//! Escalations are stored separately from pipeline state, keyed by their
//! own id, so pending approvals across all pipelines can be listed
//! without loading every pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Why a stage escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    /// The stage wants a human to approve a consequential action.
    ApprovalRequired,
    /// The stage needs the request clarified before it can proceed.
    ClarificationNeeded,
    /// The stage hit a recoverable error and wants guidance.
    ErrorRecovery,
    /// The stage cannot proceed at all without intervention.
    CannotProceed,
}

/// Lifecycle of an escalation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    #[default]
    Pending,
    Resolved,
    Rejected,
    Expired,
}

impl EscalationStatus {
    /// Whether the escalation still awaits a human decision.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A persisted human-in-the-loop escalation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    /// Unique id, format `ESC-<8 hex chars>`.
    pub escalation_id: String,
    /// Pipeline that raised this escalation.
    pub pipeline_id: String,
    /// Stage that raised this escalation.
    pub stage_name: String,
    pub kind: EscalationKind,
    /// Human-readable question or summary.
    pub message: String,
    /// Optional list of choices presented to the human.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Arbitrary context supplied by the escalating stage.
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub status: EscalationStatus,
    /// The human's answer, set on resolve/reject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Generate an escalation id: `ESC-` plus 8 hex chars.
pub fn generate_escalation_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ESC-{}", &hex[..8])
}

impl Escalation {
    pub fn new(
        pipeline_id: impl Into<String>,
        stage_name: impl Into<String>,
        kind: EscalationKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            escalation_id: generate_escalation_id(),
            pipeline_id: pipeline_id.into(),
            stage_name: stage_name.into(),
            kind,
            message: message.into(),
            options: None,
            context: HashMap::new(),
            status: EscalationStatus::Pending,
            response: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }
}
