mod envelope;
mod lister;
mod runner;

pub use envelope::{ClassifyOutput, Detection, FetchOutput, ForecastOutput, ListSitesOutput};
pub use lister::ListSitesStep;
pub use runner::{Pipeline, RunSummary};
