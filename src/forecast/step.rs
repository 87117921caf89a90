use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{error, info};
use rust_decimal_macros::dec;

use super::interval::weighted_interval_days;
use crate::core::{PipelineConfig, StepError, StepResult};
use crate::model::{Prediction, PredictionMethod};
use crate::pipeline::ForecastOutput;
use crate::store::Datastore;

/// The Forecaster step: estimate days until the next promotion from the
/// site's history and persist the prediction as the new latest.
pub struct ForecastStep {
    config: PipelineConfig,
    store: Arc<dyn Datastore>,
}

impl ForecastStep {
    pub fn new(config: &PipelineConfig, store: Arc<dyn Datastore>) -> Self {
        Self {
            config: config.clone(),
            store,
        }
    }

    pub async fn run(&self, site_id: &str) -> ForecastOutput {
        match self.execute(site_id).await {
            Ok(prediction) => ForecastOutput::ok(site_id.to_string(), prediction),
            Err(e) => {
                error!("Forecast failed for site {site_id}: {e}");
                ForecastOutput::failed(site_id.to_string(), e.to_string())
            }
        }
    }

    async fn execute(&self, site_id: &str) -> StepResult<Prediction> {
        if site_id.is_empty() {
            return Err(StepError::ValidationError(
                "Missing required field: site_id".to_string(),
            ));
        }

        let promotions = self
            .store
            .promotions_for_site(site_id, self.config.history_limit)
            .await?;
        let data_points = promotions.len();

        let (method, days_until_next, confidence) = if data_points
            < self.config.min_points_weighted
        {
            info!("Using calendar heuristic for {site_id} ({data_points} data points)");
            (
                PredictionMethod::Heuristic,
                self.config.default_interval_days,
                dec!(0.3),
            )
        } else {
            let mut timestamps: Vec<_> = promotions.iter().map(|p| p.timestamp).collect();
            timestamps.sort();
            let days = weighted_interval_days(&timestamps, self.config.default_interval_days);
            info!("Using weighted intervals for {site_id} ({data_points} data points): {days} days");
            (PredictionMethod::WeightedInterval, days, dec!(0.7))
        };

        let predicted_at = Utc::now();
        let prediction = Prediction {
            site_id: site_id.to_string(),
            predicted_at,
            predicted_date: predicted_at + Duration::days(days_until_next),
            days_until_next,
            method,
            confidence,
            data_points,
        };

        self.store.put_prediction(&prediction).await?;
        Ok(prediction)
    }
}
