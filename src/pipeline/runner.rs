use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::spawn;

use super::lister::ListSitesStep;
use crate::core::{PipelineConfig, StepError, StepResult};
use crate::detect::ClassifyStep;
use crate::fetch::FetchStep;
use crate::forecast::ForecastStep;
use crate::model::Site;
use crate::secrets::DynSecrets;
use crate::store::{BlobStore, Datastore, StoreError};

/// Local stand-in for the external orchestrator: list the sites, then fan out
/// one branch per site with bounded concurrency, each branch running
/// Fetch -> Classify -> Forecast sequentially. A failed step skips the rest
/// of its own branch and never touches the others.
pub struct Pipeline {
    config: PipelineConfig,
    lister: ListSitesStep,
    fetcher: Arc<FetchStep>,
    classifier: Arc<ClassifyStep>,
    forecaster: Arc<ForecastStep>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sites: usize,
    pub fetched: usize,
    pub promotions_found: usize,
    pub predictions_written: usize,
    pub failed_branches: usize,
}

#[derive(Debug)]
struct BranchResult {
    site_id: String,
    fetched: bool,
    promotion_found: bool,
    prediction_written: bool,
    failed: bool,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        secrets: DynSecrets,
        store: Arc<dyn Datastore>,
        blobs: Arc<dyn BlobStore>,
    ) -> StepResult<Self> {
        Ok(Self {
            config: config.clone(),
            lister: ListSitesStep::new(Arc::clone(&store)),
            fetcher: Arc::new(FetchStep::new(
                config,
                Arc::clone(&secrets),
                Arc::clone(&store),
                Arc::clone(&blobs),
            )?),
            classifier: Arc::new(ClassifyStep::new(
                config,
                Arc::clone(&secrets),
                Arc::clone(&store),
                blobs,
            )?),
            forecaster: Arc::new(ForecastStep::new(config, store)),
        })
    }

    pub async fn run(&self) -> StepResult<RunSummary> {
        let listing = self.lister.run().await;
        if listing.status != 200 {
            // No partial runs: without a complete site list there is nothing
            // safe to fan out over.
            let reason = listing.error.unwrap_or_else(|| "unknown".to_string());
            return Err(StepError::StoreError(StoreError::OperationError(format!(
                "Site listing failed: {reason}"
            ))));
        }

        let mut summary = RunSummary {
            sites: listing.sites.len(),
            ..Default::default()
        };

        let mut branches = FuturesUnordered::new();
        for site in listing.sites {
            if branches.len() >= self.config.max_concurrency {
                debug!(
                    "Reached branch concurrency limit {}, waiting for a slot",
                    self.config.max_concurrency
                );
                if let Some(result) = branches.next().await {
                    Self::absorb(&mut summary, result);
                }
            }
            branches.push(spawn(Self::run_branch(
                site,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.classifier),
                Arc::clone(&self.forecaster),
            )));
        }

        while let Some(result) = branches.next().await {
            Self::absorb(&mut summary, result);
        }

        info!(
            "Run complete: {} site(s), {} fetched, {} promotion(s), {} prediction(s), {} failed branch(es)",
            summary.sites,
            summary.fetched,
            summary.promotions_found,
            summary.predictions_written,
            summary.failed_branches
        );
        Ok(summary)
    }

    async fn run_branch(
        site: Site,
        fetcher: Arc<FetchStep>,
        classifier: Arc<ClassifyStep>,
        forecaster: Arc<ForecastStep>,
    ) -> BranchResult {
        let mut result = BranchResult {
            site_id: site.site_id.clone(),
            fetched: false,
            promotion_found: false,
            prediction_written: false,
            failed: false,
        };

        let fetch_output = fetcher.run(&site).await;
        let fetch_ok = fetch_output.is_ok();
        let Some(fetch) = fetch_output.fetch.filter(|_| fetch_ok) else {
            result.failed = true;
            return result;
        };
        result.fetched = true;

        let classify_output = classifier.run(&site, &fetch).await;
        if !classify_output.is_ok() {
            result.failed = true;
            return result;
        }
        result.promotion_found = classify_output
            .detection
            .map(|d| d.found)
            .unwrap_or(false);

        let forecast_output = forecaster.run(&site.site_id).await;
        if forecast_output.status == 200 {
            result.prediction_written = true;
        } else {
            result.failed = true;
        }

        result
    }

    fn absorb(
        summary: &mut RunSummary,
        result: Result<BranchResult, tokio::task::JoinError>,
    ) {
        match result {
            Ok(branch) => {
                debug!("Branch finished for site {}: {branch:?}", branch.site_id);
                if branch.fetched {
                    summary.fetched += 1;
                }
                if branch.promotion_found {
                    summary.promotions_found += 1;
                }
                if branch.prediction_written {
                    summary.predictions_written += 1;
                }
                if branch.failed {
                    summary.failed_branches += 1;
                }
            }
            Err(e) => {
                warn!("Branch task error: {e}");
                summary.failed_branches += 1;
            }
        }
    }
}
