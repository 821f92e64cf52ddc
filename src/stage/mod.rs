//! Stage executor abstraction, registry, and built-ins.

mod executor;
mod passthrough;
mod registry;

pub use executor::{StageContext, StageExecutor, StageResult, ValidationResult};
pub use passthrough::PassthroughStage;
pub use registry::StageRegistry;
