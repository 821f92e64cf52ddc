//! Crucible is an orchestration engine for staged, long-running
//! software-change pipelines (intake → clarify → analyze → spec → red →
//! green → refactor → deliver).
//!
//! Each stage is a pluggable [`stage::StageExecutor`] that may call out
//! to a slow external actor (an LLM, a test runner, a linter) and may
//! escalate to a human for approval or clarification. The
//! [`pipeline::PipelineController`] drives stages in order, checkpoints
//! the full pipeline state after every transition, and supports
//! pause/resume/abort plus the approve/reject escalation protocol.
//!
//! Stage business logic, CLI surfaces, and output rendering live outside
//! this crate; they plug in through the registry and consume the
//! controller's lifecycle API.

pub mod errors;
pub mod escalation;
pub mod pipeline;
pub mod stage;
pub mod template;

pub use errors::PipelineError;
pub use escalation::{Escalation, EscalationHandler, EscalationKind, EscalationStatus};
pub use pipeline::{
    PipelineController, PipelineState, PipelineStatus, PipelineStore, StageState, StageStatus,
};
pub use stage::{
    PassthroughStage, StageContext, StageExecutor, StageRegistry, StageResult, ValidationResult,
};
pub use template::{StageTemplate, TemplateRegistry};
