mod interval;
mod step;

pub use interval::weighted_interval_days;
pub use step::ForecastStep;
