//! The pipeline controller: lifecycle API plus the stage execution loop.
//!
//! The controller ties together the stage registry, the template
//! registry, the escalation handler, and the state store. Every
//! lifecycle method follows the same shape: load the pipeline, validate
//! the transition, mutate, checkpoint. The execution loop checkpoints
//! after every stage transition, so a crash loses at most the in-flight
//! stage's partial work, never a completed stage.

use chrono::Utc;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::state::{PipelineState, PipelineStatus, StageStatus};
use super::store::PipelineStore;
use crate::errors::PipelineError;
use crate::escalation::{Escalation, EscalationHandler};
use crate::stage::{StageContext, StageRegistry, StageResult};
use crate::template::TemplateRegistry;

/// Config key under which an approval response is made visible to the
/// retried stage.
pub const APPROVAL_RESPONSE_KEY: &str = "approval_response";
/// Config key holding the id of the most recently approved escalation.
pub const APPROVED_ESCALATION_KEY: &str = "approved_escalation";

/// Orchestrates pipelines: create, execute, pause/resume, abort, and the
/// approve/reject escalation protocol.
pub struct PipelineController {
    project_path: PathBuf,
    registry: StageRegistry,
    templates: TemplateRegistry,
    escalations: EscalationHandler,
    store: PipelineStore,
}

impl PipelineController {
    /// Create a controller rooted at a project directory. The registry
    /// and template registry are injected explicitly so tests and
    /// concurrent pipelines can use isolated instances.
    pub fn new(
        project_path: impl Into<PathBuf>,
        registry: StageRegistry,
        templates: TemplateRegistry,
    ) -> Self {
        let project_path = project_path.into();
        let escalations = EscalationHandler::new(&project_path);
        let store = PipelineStore::new(&project_path);
        Self {
            project_path,
            registry,
            templates,
            escalations,
            store,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Mutable registry access, for registering or overriding executors
    /// after construction.
    pub fn registry_mut(&mut self) -> &mut StageRegistry {
        &mut self.registry
    }

    pub fn templates_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.templates
    }

    pub fn escalations(&self) -> &EscalationHandler {
        &self.escalations
    }

    pub fn store(&self) -> &PipelineStore {
        &self.store
    }

    /// Create a pipeline from a named template. The template's stage list
    /// becomes the immutable `stage_order`; its defaults seed the config,
    /// with caller-supplied values winning on collision.
    pub fn create(
        &self,
        request: &str,
        template: &str,
        config: Option<HashMap<String, Value>>,
    ) -> Result<PipelineState, PipelineError> {
        let tpl = self
            .templates
            .get(template)
            .ok_or_else(|| PipelineError::UnknownTemplate {
                name: template.to_string(),
            })?;

        let mut merged = tpl.defaults.clone();
        if let Some(overrides) = config {
            merged.extend(overrides);
        }

        let state = PipelineState::new(request, template, tpl.stages.clone(), merged);
        self.store.save(&state)?;
        info!(
            pipeline_id = %state.pipeline_id,
            template,
            stages = state.stage_order.len(),
            "pipeline created"
        );
        Ok(state)
    }

    /// Start executing a pending pipeline and drive it until it
    /// completes, fails, or escalates.
    pub async fn execute(&self, pipeline_id: &str) -> Result<PipelineState, PipelineError> {
        let mut state = self.load_or_not_found(pipeline_id)?;
        Self::ensure_not_terminal(&state, "execute")?;
        if state.status != PipelineStatus::Pending {
            return Err(Self::invalid_transition(&state, "execute"));
        }

        state.status = PipelineStatus::Running;
        self.checkpoint(&mut state)?;
        self.run_loop(&mut state).await?;
        Ok(state)
    }

    /// Suspend a pipeline at the next stage boundary. Cooperative: a
    /// stage already in flight is not interrupted.
    pub fn pause(&self, pipeline_id: &str) -> Result<PipelineState, PipelineError> {
        let mut state = self.load_or_not_found(pipeline_id)?;
        Self::ensure_not_terminal(&state, "pause")?;
        if !matches!(
            state.status,
            PipelineStatus::Pending | PipelineStatus::Running
        ) {
            return Err(Self::invalid_transition(&state, "pause"));
        }

        state.status = PipelineStatus::Paused;
        self.checkpoint(&mut state)?;
        info!(pipeline_id, "pipeline paused");
        Ok(state)
    }

    /// Resume a paused pipeline from `current_stage`. Fails if any
    /// pending escalation exists: approvals go through approve/reject,
    /// never around them.
    pub async fn resume(&self, pipeline_id: &str) -> Result<PipelineState, PipelineError> {
        let mut state = self.load_or_not_found(pipeline_id)?;
        Self::ensure_not_terminal(&state, "resume")?;

        let pending = self.escalations.get_pending(Some(pipeline_id))?;
        if !pending.is_empty() {
            return Err(PipelineError::PendingEscalations {
                id: pipeline_id.to_string(),
                count: pending.len(),
            });
        }
        if state.status != PipelineStatus::Paused {
            return Err(Self::invalid_transition(&state, "resume"));
        }

        state.status = PipelineStatus::Running;
        self.checkpoint(&mut state)?;
        info!(pipeline_id, stage = %state.current_stage, "pipeline resumed");
        self.run_loop(&mut state).await?;
        Ok(state)
    }

    /// Abort a non-terminal pipeline. A stage currently `Running` is
    /// marked failed with the abort reason as its error.
    pub fn abort(
        &self,
        pipeline_id: &str,
        reason: Option<&str>,
    ) -> Result<PipelineState, PipelineError> {
        let mut state = self.load_or_not_found(pipeline_id)?;
        Self::ensure_not_terminal(&state, "abort")?;

        let reason = reason.unwrap_or("aborted by caller");
        let now = Utc::now();
        for stage in state.stages.values_mut() {
            if stage.status == StageStatus::Running {
                stage.status = StageStatus::Failed;
                stage.error = Some(reason.to_string());
                stage.completed_at = Some(now);
            }
        }
        state.status = PipelineStatus::Aborted;
        self.checkpoint(&mut state)?;
        warn!(pipeline_id, reason, "pipeline aborted");
        Ok(state)
    }

    /// Resolve a pending escalation and re-enter the execution loop at
    /// the escalating stage, with the approval response visible to it
    /// through the pipeline config.
    pub async fn approve(
        &self,
        pipeline_id: &str,
        escalation_id: &str,
        response: Value,
    ) -> Result<PipelineState, PipelineError> {
        let mut state = self.load_or_not_found(pipeline_id)?;
        Self::ensure_not_terminal(&state, "approve")?;
        if state.status != PipelineStatus::WaitingApproval {
            return Err(Self::invalid_transition(&state, "approve"));
        }

        let escalation = self.escalations.get(escalation_id)?;
        if escalation.pipeline_id != pipeline_id {
            return Err(PipelineError::EscalationNotFound {
                id: escalation_id.to_string(),
            });
        }
        self.escalations.resolve(escalation_id, response.clone())?;

        state
            .config
            .insert(APPROVAL_RESPONSE_KEY.to_string(), response);
        state
            .config
            .insert(APPROVED_ESCALATION_KEY.to_string(), json!(escalation_id));
        state.status = PipelineStatus::Running;
        self.checkpoint(&mut state)?;
        info!(
            pipeline_id,
            escalation_id,
            stage = %state.current_stage,
            "escalation approved, retrying stage"
        );
        self.run_loop(&mut state).await?;
        Ok(state)
    }

    /// Reject a pending escalation and abort the pipeline.
    pub fn reject(
        &self,
        pipeline_id: &str,
        escalation_id: &str,
        reason: &str,
    ) -> Result<PipelineState, PipelineError> {
        let mut state = self.load_or_not_found(pipeline_id)?;
        Self::ensure_not_terminal(&state, "reject")?;
        if state.status != PipelineStatus::WaitingApproval {
            return Err(Self::invalid_transition(&state, "reject"));
        }

        let escalation = self.escalations.get(escalation_id)?;
        if escalation.pipeline_id != pipeline_id {
            return Err(PipelineError::EscalationNotFound {
                id: escalation_id.to_string(),
            });
        }
        self.escalations.reject(escalation_id, reason)?;

        let now = Utc::now();
        for stage in state.stages.values_mut() {
            if stage.status == StageStatus::Running {
                stage.status = StageStatus::Failed;
                stage.error = Some(reason.to_string());
                stage.completed_at = Some(now);
            }
        }
        state.status = PipelineStatus::Aborted;
        self.checkpoint(&mut state)?;
        warn!(pipeline_id, escalation_id, reason, "escalation rejected, pipeline aborted");
        Ok(state)
    }

    /// Look up a pipeline's current persisted state.
    pub fn get_status(&self, pipeline_id: &str) -> Result<PipelineState, PipelineError> {
        self.load_or_not_found(pipeline_id)
    }

    /// Drive stages from `current_stage` until the pipeline leaves the
    /// `Running` status. Checkpoints after every transition.
    async fn run_loop(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        while state.status == PipelineStatus::Running {
            let stage_name = state.current_stage.clone();
            if !state.stages.contains_key(&stage_name) {
                // Only reachable with a hand-edited or corrupted record.
                self.fail_stage(
                    state,
                    &stage_name,
                    &format!("current stage '{stage_name}' is not part of this pipeline"),
                )?;
                break;
            }

            if let Some(stage) = state.stage_mut(&stage_name) {
                stage.status = StageStatus::Running;
                stage.started_at = Some(Utc::now());
                stage.error = None;
            }
            self.checkpoint(state)?;
            debug!(pipeline_id = %state.pipeline_id, stage = %stage_name, "stage started");

            let result = self.run_stage(state, &stage_name).await;
            self.apply_result(state, &stage_name, result)?;
        }
        Ok(())
    }

    /// Resolve the executor, build the context, enforce the input
    /// contract, and run the stage. Registration and input-contract
    /// failures are synthesized as `Failed` results; an `Err` from the
    /// executor is converted rather than propagated.
    async fn run_stage(&self, state: &PipelineState, stage_name: &str) -> StageResult {
        let Some(executor) = self.registry.get(stage_name) else {
            return StageResult::failed(format!("stage '{stage_name}' is not registered"));
        };

        let context = StageContext {
            pipeline_id: state.pipeline_id.clone(),
            stage_name: stage_name.to_string(),
            project_path: self.project_path.clone(),
            input_artifacts: state.artifact_pool(),
            request: state.request.clone(),
            config: state.config.clone(),
        };

        let missing: Vec<String> = executor
            .required_inputs()
            .into_iter()
            .filter(|key| !context.input_artifacts.contains_key(key))
            .collect();
        if !missing.is_empty() {
            return StageResult::failed(format!(
                "missing required inputs: {}",
                missing.join(", ")
            ));
        }

        match executor.execute(&context).await {
            Ok(result) => result,
            Err(e) => StageResult::failed(format!(
                "stage '{stage_name}' raised an unexpected error: {e:#}"
            )),
        }
    }

    /// Interpret a stage result: advance, fail, or escalate. Each arm
    /// ends in a checkpoint.
    fn apply_result(
        &self,
        state: &mut PipelineState,
        stage_name: &str,
        result: StageResult,
    ) -> Result<(), PipelineError> {
        match result {
            StageResult::Success {
                artifacts,
                next_stage,
            } => {
                // Validate a redirect before committing the transition.
                if let Some(ref next) = next_stage
                    && !state.stages.contains_key(next)
                {
                    return self.fail_stage(
                        state,
                        stage_name,
                        &format!("next_stage override '{next}' is not in the stage order"),
                    );
                }

                if let Some(stage) = state.stage_mut(stage_name) {
                    stage.status = StageStatus::Completed;
                    stage.artifacts = artifacts;
                    stage.completed_at = Some(Utc::now());
                }

                let next = next_stage
                    .or_else(|| state.next_stage_after(stage_name).map(str::to_string));
                match next {
                    Some(next) => {
                        debug!(
                            pipeline_id = %state.pipeline_id,
                            from = stage_name,
                            to = %next,
                            "stage completed, advancing"
                        );
                        state.current_stage = next;
                    }
                    None => {
                        state.status = PipelineStatus::Completed;
                        info!(pipeline_id = %state.pipeline_id, "pipeline completed");
                    }
                }
                self.checkpoint(state)
            }
            StageResult::Failed { error } => self.fail_stage(state, stage_name, &error),
            StageResult::Escalate {
                kind,
                message,
                options,
                context,
            } => {
                // The stage stays Running: neither completed nor failed,
                // and retried as-is after approval.
                let mut escalation =
                    Escalation::new(&state.pipeline_id, stage_name, kind, message)
                        .with_context(context);
                escalation.options = options;
                let escalation_id = self.escalations.create(escalation)?;

                state.status = PipelineStatus::WaitingApproval;
                self.checkpoint(state)?;
                info!(
                    pipeline_id = %state.pipeline_id,
                    stage = stage_name,
                    escalation_id = %escalation_id,
                    "stage escalated, pipeline waiting for approval"
                );
                Ok(())
            }
        }
    }

    /// Record a stage failure and end the pipeline in `Failed`.
    fn fail_stage(
        &self,
        state: &mut PipelineState,
        stage_name: &str,
        error: &str,
    ) -> Result<(), PipelineError> {
        if let Some(stage) = state.stage_mut(stage_name) {
            stage.status = StageStatus::Failed;
            stage.error = Some(error.to_string());
            stage.completed_at = Some(Utc::now());
        }
        state.status = PipelineStatus::Failed;
        warn!(
            pipeline_id = %state.pipeline_id,
            stage = stage_name,
            error,
            "stage failed, pipeline failed"
        );
        self.checkpoint(state)
    }

    /// Persist a full snapshot with a fresh `updated_at`.
    fn checkpoint(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        state.touch();
        self.store.save(state)?;
        Ok(())
    }

    fn load_or_not_found(&self, pipeline_id: &str) -> Result<PipelineState, PipelineError> {
        self.store
            .load(pipeline_id)?
            .ok_or_else(|| PipelineError::PipelineNotFound {
                id: pipeline_id.to_string(),
            })
    }

    fn ensure_not_terminal(
        state: &PipelineState,
        action: &'static str,
    ) -> Result<(), PipelineError> {
        if state.is_terminal() {
            return Err(Self::invalid_transition(state, action));
        }
        Ok(())
    }

    fn invalid_transition(state: &PipelineState, action: &'static str) -> PipelineError {
        PipelineError::InvalidTransition {
            id: state.pipeline_id.clone(),
            status: state.status,
            action,
        }
    }
}
