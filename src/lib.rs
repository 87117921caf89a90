pub mod core;
pub mod detect;
pub mod fetch;
pub mod forecast;
pub mod model;
pub mod pipeline;
pub mod secrets;
pub mod store;

pub use crate::core::{PipelineConfig, StepError, StepResult};
pub use detect::ClassifyStep;
pub use fetch::FetchStep;
pub use forecast::ForecastStep;
pub use model::{Metric, Prediction, Promotion, Site};
pub use pipeline::{ListSitesStep, Pipeline, RunSummary};
pub use store::{BlobStore, Datastore};
