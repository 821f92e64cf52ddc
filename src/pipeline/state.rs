//! Pipeline and stage state: the persisted aggregate the controller
//! checkpoints after every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Overall pipeline lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Created but not yet executed.
    #[default]
    Pending,
    /// The execution loop is driving stages.
    Running,
    /// Suspended by `pause()`; resumable.
    Paused,
    /// Suspended on a pending escalation; resumable via approve/reject.
    WaitingApproval,
    /// All stages completed (terminal).
    Completed,
    /// A stage failed (terminal).
    Failed,
    /// Aborted by the caller or a rejected escalation (terminal).
    Aborted,
}

impl PipelineStatus {
    /// Terminal statuses admit no further lifecycle transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Per-stage execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Per-stage bookkeeping, owned exclusively by its parent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub name: String,
    pub status: StageStatus,
    /// Artifacts produced by this stage. Merged into the running artifact
    /// pool only after the stage reports success.
    #[serde(default)]
    pub artifacts: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Pending,
            artifacts: HashMap::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Generate a pipeline id: `PL-<yyyymmdd>-<8 hex chars>`.
pub fn generate_pipeline_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("PL-{}-{}", Utc::now().format("%Y%m%d"), &hex[..8])
}

/// The fully persisted aggregate root for one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Globally unique id, assigned at creation, immutable.
    pub pipeline_id: String,
    /// Name of the template `stage_order` was built from.
    pub template: String,
    pub status: PipelineStatus,
    /// Free-form description of the requested work. Opaque to the core.
    pub request: String,
    /// Configuration passed through unchanged to every stage context.
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Ordered stage names, fixed at creation, never mutated.
    pub stage_order: Vec<String>,
    /// The stage to run next (or last attempted).
    pub current_stage: String,
    /// One entry per name in `stage_order`.
    pub stages: HashMap<String, StageState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    /// Create a fresh pipeline: status `Pending`, every stage `Pending`,
    /// `current_stage` pointing at the first stage in the order.
    pub fn new(
        request: &str,
        template: &str,
        stage_order: Vec<String>,
        config: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        let stages = stage_order
            .iter()
            .map(|name| (name.clone(), StageState::new(name)))
            .collect();
        let current_stage = stage_order.first().cloned().unwrap_or_default();
        Self {
            pipeline_id: generate_pipeline_id(),
            template: template.to_string(),
            status: PipelineStatus::Pending,
            request: request.to_string(),
            config,
            stage_order,
            current_stage,
            stages,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Bump `updated_at`. Called on every checkpoint.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn stage(&self, name: &str) -> Option<&StageState> {
        self.stages.get(name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageState> {
        self.stages.get_mut(name)
    }

    /// The stage after `name` in `stage_order`, if any.
    pub fn next_stage_after(&self, name: &str) -> Option<&str> {
        let idx = self.stage_order.iter().position(|s| s == name)?;
        self.stage_order.get(idx + 1).map(String::as_str)
    }

    /// The accumulated artifact pool: the union of artifacts from every
    /// completed stage, visited in `stage_order` order so a later stage's
    /// value wins when two stages write the same key.
    pub fn artifact_pool(&self) -> HashMap<String, Value> {
        let mut pool = HashMap::new();
        for name in &self.stage_order {
            if let Some(stage) = self.stages.get(name)
                && stage.status == StageStatus::Completed
            {
                pool.extend(stage.artifacts.clone());
            }
        }
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_state() -> PipelineState {
        PipelineState::new(
            "add retry logic",
            "implement",
            vec![
                "intake".to_string(),
                "analyze".to_string(),
                "green".to_string(),
            ],
            HashMap::new(),
        )
    }

    #[test]
    fn test_pipeline_id_format() {
        let id = generate_pipeline_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PL");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_pipeline_all_stages_pending() {
        let state = make_state();
        assert_eq!(state.status, PipelineStatus::Pending);
        assert_eq!(state.current_stage, "intake");
        assert_eq!(state.stages.len(), 3);
        assert!(
            state
                .stages
                .values()
                .all(|s| s.status == StageStatus::Pending)
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PipelineStatus::Pending.is_terminal());
        assert!(!PipelineStatus::Running.is_terminal());
        assert!(!PipelineStatus::Paused.is_terminal());
        assert!(!PipelineStatus::WaitingApproval.is_terminal());
        assert!(PipelineStatus::Completed.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_next_stage_after() {
        let state = make_state();
        assert_eq!(state.next_stage_after("intake"), Some("analyze"));
        assert_eq!(state.next_stage_after("analyze"), Some("green"));
        assert_eq!(state.next_stage_after("green"), None);
        assert_eq!(state.next_stage_after("unknown"), None);
    }

    #[test]
    fn test_artifact_pool_only_completed_stages() {
        let mut state = make_state();
        let intake = state.stage_mut("intake").unwrap();
        intake.status = StageStatus::Completed;
        intake.artifacts.insert("ticket".to_string(), json!("T-1"));

        let analyze = state.stage_mut("analyze").unwrap();
        analyze.status = StageStatus::Failed;
        analyze
            .artifacts
            .insert("partial".to_string(), json!("ignored"));

        let pool = state.artifact_pool();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool["ticket"], json!("T-1"));
    }

    #[test]
    fn test_artifact_pool_later_stage_overwrites_same_key() {
        let mut state = make_state();
        for (name, value) in [("intake", "first"), ("analyze", "second")] {
            let stage = state.stage_mut(name).unwrap();
            stage.status = StageStatus::Completed;
            stage.artifacts.insert("summary".to_string(), json!(value));
        }

        let pool = state.artifact_pool();
        assert_eq!(pool["summary"], json!("second"));
    }

    #[test]
    fn test_touch_bumps_updated_at() {
        let mut state = make_state();
        let before = state.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        state.touch();
        assert!(state.updated_at > before);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut state = make_state();
        state.stage_mut("intake").unwrap().status = StageStatus::Completed;
        state.config.insert("tdd".to_string(), json!(true));

        let encoded = serde_json::to_string_pretty(&state).unwrap();
        let decoded: PipelineState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.pipeline_id, state.pipeline_id);
        assert_eq!(decoded.stage_order, state.stage_order);
        assert_eq!(
            decoded.stage("intake").unwrap().status,
            StageStatus::Completed
        );
        assert_eq!(decoded.config["tdd"], json!(true));
    }
}
