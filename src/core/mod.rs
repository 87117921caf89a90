mod config;
mod errors;

pub use config::{PipelineConfig, USER_AGENTS};
pub use errors::{StepError, StepResult};
