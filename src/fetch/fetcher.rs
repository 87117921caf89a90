use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{error, info, warn};
use reqwest::{Client, ClientBuilder};
use rust_decimal::Decimal;
use url::Url;

use super::direct::DirectFetcher;
use super::fallback::FallbackClient;
use super::robots::direct_fetch_allowed;
use crate::core::{PipelineConfig, StepError, StepResult};
use crate::model::{FetchMethod, FetchRecord, Metric, Site};
use crate::pipeline::FetchOutput;
use crate::secrets::{DynSecrets, FALLBACK_API_KEY};
use crate::store::{BlobStore, Datastore};

/// The Fetcher step: robots-gated two-tier fetch, blob persistence, and a
/// Metric per attempt. All failures are converted to a status-500 envelope
/// with the site preserved; nothing escapes the step boundary.
pub struct FetchStep {
    config: PipelineConfig,
    direct: DirectFetcher,
    fallback: FallbackClient,
    robots_client: Client,
    secrets: DynSecrets,
    store: Arc<dyn Datastore>,
    blobs: Arc<dyn BlobStore>,
}

struct FetchedContent {
    content: String,
    method: FetchMethod,
    cost: Decimal,
}

impl FetchStep {
    pub fn new(
        config: &PipelineConfig,
        secrets: DynSecrets,
        store: Arc<dyn Datastore>,
        blobs: Arc<dyn BlobStore>,
    ) -> StepResult<Self> {
        let robots_client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config: config.clone(),
            direct: DirectFetcher::new(config)?,
            fallback: FallbackClient::new(config)?,
            robots_client,
            secrets,
            store,
            blobs,
        })
    }

    pub async fn run(&self, site: &Site) -> FetchOutput {
        match self.execute(site).await {
            Ok(fetch) => FetchOutput::ok(site.clone(), fetch),
            Err(e) => {
                error!("Fetch failed for site {}: {e}", site.site_id);
                self.record_failure_metric(site, &e).await;
                FetchOutput::failed(site.clone(), e.to_string())
            }
        }
    }

    async fn execute(&self, site: &Site) -> StepResult<FetchRecord> {
        if site.site_id.is_empty() || site.url.is_empty() {
            return Err(StepError::ValidationError(
                "Missing required fields: site_id or url".to_string(),
            ));
        }
        let url = Url::parse(&site.url)?;

        let started = Instant::now();
        let timestamp = Utc::now();

        let fetched = self.fetch_tiered(site, &url).await?;

        let blob_key = format!(
            "scrapes/{}/{}.html",
            site.site_id,
            timestamp.to_rfc3339()
        );
        self.blobs
            .put_object(&blob_key, fetched.content.as_bytes(), "text/html")
            .await?;

        let duration_seconds = started.elapsed().as_secs_f64();
        let record = FetchRecord {
            blob_key,
            timestamp,
            content_length: fetched.content.len(),
            duration_seconds,
            method: fetched.method,
            cost: fetched.cost,
        };

        self.store
            .put_metric(&Metric {
                metric_id: Metric::id_for(&site.site_id, timestamp),
                timestamp,
                site_id: site.site_id.clone(),
                success: true,
                method: Some(record.method),
                duration_seconds: Some(duration_seconds),
                content_length: Some(record.content_length),
                cost: record.cost,
                error: None,
                expires_at: timestamp + self.config.metric_retention,
            })
            .await?;

        info!(
            "Fetched {} via {:?} in {:.2}s ({} bytes)",
            site.url, record.method, duration_seconds, record.content_length
        );
        Ok(record)
    }

    async fn fetch_tiered(&self, site: &Site, url: &Url) -> StepResult<FetchedContent> {
        if !direct_fetch_allowed(&self.robots_client, url).await {
            warn!(
                "robots.txt blocks direct fetch of {}, going straight to fallback",
                site.url
            );
            let fetch = self.fallback_scrape(site).await.map_err(|e| {
                StepError::FetchError(format!(
                    "Fallback failed for policy-blocked site {}: {e}",
                    site.site_id
                ))
            })?;
            return Ok(FetchedContent {
                content: fetch.content,
                method: FetchMethod::FallbackViaPolicyBlock,
                cost: fetch.cost,
            });
        }

        match self.direct.fetch(url).await {
            Ok(content) => Ok(FetchedContent {
                content,
                method: FetchMethod::DirectHttp,
                cost: Decimal::ZERO,
            }),
            Err(direct_error) => {
                warn!(
                    "Direct tier failed for {}: {direct_error}, falling back",
                    site.url
                );
                let fetch = self.fallback_scrape(site).await.map_err(|fallback_error| {
                    StepError::FetchError(format!(
                        "All fetch tiers failed. Direct: {direct_error}. Fallback: {fallback_error}"
                    ))
                })?;
                Ok(FetchedContent {
                    content: fetch.content,
                    method: FetchMethod::FallbackAfterError,
                    cost: fetch.cost,
                })
            }
        }
    }

    async fn fallback_scrape(&self, site: &Site) -> StepResult<super::fallback::FallbackFetch> {
        let api_key = self.secrets.get_secret(FALLBACK_API_KEY).await?;
        self.fallback.scrape(&site.url, &api_key).await
    }

    /// Best-effort: a failure writing the failure metric is logged and
    /// swallowed so it never replaces the original error in the envelope.
    async fn record_failure_metric(&self, site: &Site, step_error: &StepError) {
        let timestamp = Utc::now();
        let metric = Metric {
            metric_id: Metric::id_for(&site.site_id, timestamp),
            timestamp,
            site_id: site.site_id.clone(),
            success: false,
            method: None,
            duration_seconds: None,
            content_length: None,
            cost: Decimal::ZERO,
            error: Some(step_error.to_string()),
            expires_at: timestamp + self.config.metric_retention,
        };
        if let Err(e) = self.store.put_metric(&metric).await {
            warn!("Could not record failure metric for {}: {e}", site.site_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecrets;
    use crate::store::{MemoryBlobStore, MemoryStore};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        step: FetchStep,
        store: MemoryStore,
        blobs: MemoryBlobStore,
        server: MockServer,
    }

    async fn harness() -> Harness {
        let server = MockServer::start().await;
        let config = PipelineConfig::default()
            .with_request_timeout(Duration::from_millis(300))
            .with_retry_backoff(0.05)
            .with_fallback_endpoint(format!("{}/v2/scrape", server.uri()));
        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let secrets = Arc::new(StaticSecrets::new().with(FALLBACK_API_KEY, "fc-test"));
        let step = FetchStep::new(
            &config,
            secrets,
            Arc::new(store.clone()),
            Arc::new(blobs.clone()),
        )
        .unwrap();
        Harness {
            step,
            store,
            blobs,
            server,
        }
    }

    fn site_for(server: &MockServer, page: &str) -> Site {
        Site {
            site_id: "s1".to_string(),
            name: "Test Shop".to_string(),
            url: format!("{}{}", server.uri(), page),
            enabled: true,
            selectors: vec![".promo".to_string()],
        }
    }

    fn mock_fallback_success(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "html": content },
            "creditsUsed": 1
        }))
    }

    #[tokio::test]
    async fn direct_tier_success_persists_blob_and_metric() {
        let h = harness().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<div>sale</div>"))
            .mount(&h.server)
            .await;

        let output = h.step.run(&site_for(&h.server, "/deals")).await;
        assert_eq!(output.status, 200);
        let fetch = output.fetch.unwrap();
        assert_eq!(fetch.method, FetchMethod::DirectHttp);
        assert_eq!(fetch.cost, Decimal::ZERO);

        let blob = h.blobs.get_object(&fetch.blob_key).await.unwrap();
        assert_eq!(blob, b"<div>sale</div>");

        let metrics = h.store.metrics();
        assert_eq!(metrics.len(), 1);
        assert!(metrics[0].success);
        assert_eq!(metrics[0].method, Some(FetchMethod::DirectHttp));
        assert_eq!(metrics[0].cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn policy_block_skips_direct_tier_entirely() {
        let h = harness().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"),
            )
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/scrape"))
            .respond_with(mock_fallback_success("<div>fallback content</div>"))
            .mount(&h.server)
            .await;

        let output = h.step.run(&site_for(&h.server, "/deals")).await;
        assert_eq!(output.status, 200);
        let fetch = output.fetch.unwrap();
        assert_eq!(fetch.method, FetchMethod::FallbackViaPolicyBlock);
        assert!(fetch.cost > Decimal::ZERO);

        // The page itself must never have been hit directly.
        let direct_hits: Vec<_> = h
            .server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path() == "/deals")
            .collect();
        assert!(direct_hits.is_empty());
    }

    #[tokio::test]
    async fn direct_failure_escalates_to_fallback() {
        let h = harness().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/scrape"))
            .respond_with(mock_fallback_success("<div>rescued</div>"))
            .mount(&h.server)
            .await;

        let output = h.step.run(&site_for(&h.server, "/deals")).await;
        assert_eq!(output.status, 200);
        assert_eq!(
            output.fetch.unwrap().method,
            FetchMethod::FallbackAfterError
        );
    }

    #[tokio::test]
    async fn total_failure_writes_failure_metric_and_500_envelope() {
        let h = harness().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "no credits"
            })))
            .mount(&h.server)
            .await;

        let site = site_for(&h.server, "/deals");
        let output = h.step.run(&site).await;
        assert_eq!(output.status, 500);
        assert_eq!(output.site.site_id, "s1");
        assert!(output.fetch.is_none());
        assert!(output.error.unwrap().contains("All fetch tiers failed"));

        let metrics = h.store.metrics();
        assert_eq!(metrics.len(), 1);
        assert!(!metrics[0].success);
        assert!(metrics[0].error.as_deref().unwrap().contains("no credits"));
        assert_eq!(metrics[0].cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn missing_url_fails_fast_with_validation_error() {
        let h = harness().await;
        let site = Site {
            site_id: "s1".to_string(),
            name: "broken".to_string(),
            url: String::new(),
            enabled: true,
            selectors: vec![],
        };
        let output = h.step.run(&site).await;
        assert_eq!(output.status, 500);
        assert!(output.error.unwrap().contains("Missing required fields"));
    }
}
