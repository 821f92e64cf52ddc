//! The stage executor abstraction.
//!
//! A stage executor is one pluggable unit of work in a pipeline (intake,
//! clarify, analyze, spec, red, green, refactor, deliver, ...). The
//! controller hands it a [`StageContext`] built from the accumulated
//! artifact pool and interprets the [`StageResult`] it returns.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::escalation::EscalationKind;

/// Everything a stage needs to do its work. Built fresh for each
/// invocation, never persisted.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Id of the pipeline this stage runs inside.
    pub pipeline_id: String,
    /// Name of the stage being executed.
    pub stage_name: String,
    /// Root of the project the pipeline operates on.
    pub project_path: PathBuf,
    /// Union of all artifacts produced by previously completed stages.
    pub input_artifacts: HashMap<String, Value>,
    /// The original work request, passed through unchanged.
    pub request: String,
    /// Pipeline configuration, passed through unchanged to every stage.
    pub config: HashMap<String, Value>,
}

impl StageContext {
    /// Look up a single input artifact by key.
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.input_artifacts.get(key)
    }
}

/// Outcome of a stage execution.
///
/// Modeled as a sum type so the controller's loop handles every outcome
/// exhaustively: a stage either succeeds (optionally redirecting the
/// pipeline), fails with a message, or escalates to a human.
#[derive(Debug, Clone)]
pub enum StageResult {
    /// The stage completed its work.
    Success {
        /// Artifacts produced by this stage, merged into the pool.
        artifacts: HashMap<String, Value>,
        /// Optional override for the stage to run next.
        next_stage: Option<String>,
    },
    /// The stage could not complete. This is the expected, first-class way
    /// to report business failures; it is never retried automatically.
    Failed { error: String },
    /// The stage needs a human decision before the pipeline can continue.
    Escalate {
        kind: EscalationKind,
        message: String,
        options: Option<Vec<String>>,
        context: HashMap<String, Value>,
    },
}

impl StageResult {
    /// A successful result with no artifacts.
    pub fn success() -> Self {
        Self::Success {
            artifacts: HashMap::new(),
            next_stage: None,
        }
    }

    /// A failed result with a human-readable error.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    /// An escalation with no options or extra context.
    pub fn escalate(kind: EscalationKind, message: impl Into<String>) -> Self {
        Self::Escalate {
            kind,
            message: message.into(),
            options: None,
            context: HashMap::new(),
        }
    }

    /// Attach an artifact to a success result. No-op on other variants.
    pub fn with_artifact(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Self::Success { artifacts, .. } = &mut self {
            artifacts.insert(key.into(), value);
        }
        self
    }

    /// Redirect the pipeline to a named stage after this one succeeds.
    pub fn with_next_stage(mut self, stage: impl Into<String>) -> Self {
        if let Self::Success { next_stage, .. } = &mut self {
            *next_stage = Some(stage.into());
        }
        self
    }

    /// Attach choice options to an escalation. No-op on other variants.
    pub fn with_options(mut self, opts: Vec<String>) -> Self {
        if let Self::Escalate { options, .. } = &mut self {
            *options = Some(opts);
        }
        self
    }

    /// Attach a context entry to an escalation. No-op on other variants.
    pub fn with_escalation_context(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Self::Escalate { context, .. } = &mut self {
            context.insert(key.into(), value);
        }
        self
    }
}

/// Result of an executor's self-check on a produced artifact.
///
/// The controller only enforces *input* requirements; output validation
/// is a utility for conforming executors to check their own work.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn invalid(issues: Vec<String>) -> Self {
        Self {
            valid: false,
            issues,
        }
    }
}

/// A pluggable unit of pipeline work.
///
/// Implementations may block for arbitrary durations (LLM calls, test
/// runs, linters). Expected business failures must be reported as
/// `StageResult::Failed`, not as `Err`; an `Err` from `execute` is
/// treated as an unexpected fault and converted by the controller into a
/// failed stage rather than crashing the pipeline.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Perform the stage's work.
    async fn execute(&self, context: &StageContext) -> anyhow::Result<StageResult>;

    /// Artifact keys that must be present in `input_artifacts` before
    /// `execute` is invoked. The controller fails the stage without
    /// calling `execute` if any are missing.
    fn required_inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Self-check a produced artifact. Not consulted by the controller.
    fn validate_output(&self, _artifact: &Value) -> ValidationResult {
        ValidationResult::valid()
    }
}
