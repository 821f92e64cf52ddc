//! Human-in-the-loop escalation subsystem.
//!
//! A stage that cannot proceed without a human decision returns an
//! escalate result; the controller records an [`Escalation`] here and
//! parks the pipeline in `WaitingApproval` until the record is resolved
//! or rejected. Escalations are persisted independently of pipeline
//! state so "all pending approvals" is a cheap query.

mod handler;
mod types;

pub use handler::EscalationHandler;
pub use types::{Escalation, EscalationKind, EscalationStatus, generate_escalation_id};
