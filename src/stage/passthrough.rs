//! Built-in pass-through executor.
//!
//! Succeeds immediately and records that it ran. Useful for stubbing
//! template stages that have no real implementation registered yet, and
//! as a scripted stage in tests.

use async_trait::async_trait;
use serde_json::json;

use super::executor::{StageContext, StageExecutor, StageResult};

/// An executor that does no work and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStage;

impl PassthroughStage {
    pub fn new() -> Self {
        Self
    }

    /// Convenience: a boxed instance for registry factories.
    pub fn boxed() -> Box<dyn StageExecutor> {
        Box::new(Self)
    }
}

#[async_trait]
impl StageExecutor for PassthroughStage {
    async fn execute(&self, context: &StageContext) -> anyhow::Result<StageResult> {
        Ok(StageResult::success()
            .with_artifact(format!("{}_passthrough", context.stage_name), json!(true)))
    }
}
