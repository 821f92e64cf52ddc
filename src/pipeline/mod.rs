//! Pipeline state machine, persistence, and the orchestrating controller.
//!
//! A pipeline is an ordered sequence of named stages built from a
//! template. The controller drives stages one at a time, checkpointing
//! the full [`PipelineState`] after every transition so execution can
//! resume across process restarts. Stages that need a human decision
//! park the pipeline in `WaitingApproval` through the escalation
//! subsystem.

mod controller;
mod state;
mod store;

pub use controller::{APPROVAL_RESPONSE_KEY, APPROVED_ESCALATION_KEY, PipelineController};
pub use state::{PipelineState, PipelineStatus, StageState, StageStatus, generate_pipeline_id};
pub use store::PipelineStore;
