use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use uuid::Uuid;

use super::model::{visible_text, ModelClient, ModelDetection};
use super::structural;
use crate::core::{PipelineConfig, StepError, StepResult};
use crate::model::{truncate_chars, DetectionMethod, FetchRecord, Promotion, Site};
use crate::pipeline::{ClassifyOutput, Detection};
use crate::secrets::{DynSecrets, MODEL_API_KEY};
use crate::store::{BlobStore, Datastore};

/// The Classifier step: structural selector matching first, model-based
/// classification as the optional fallback tier. A negative result is a
/// normal outcome; only infrastructure problems (blob/store access, malformed
/// input) produce a failure envelope.
pub struct ClassifyStep {
    config: PipelineConfig,
    store: Arc<dyn Datastore>,
    blobs: Arc<dyn BlobStore>,
    model: Option<ModelClient>,
    secrets: DynSecrets,
}

impl ClassifyStep {
    pub fn new(
        config: &PipelineConfig,
        secrets: DynSecrets,
        store: Arc<dyn Datastore>,
        blobs: Arc<dyn BlobStore>,
    ) -> StepResult<Self> {
        let model = if config.model_fallback_enabled {
            Some(ModelClient::new(config)?)
        } else {
            None
        };
        Ok(Self {
            config: config.clone(),
            store,
            blobs,
            model,
            secrets,
        })
    }

    pub async fn run(&self, site: &Site, fetch: &FetchRecord) -> ClassifyOutput {
        match self.execute(site, fetch).await {
            Ok(detection) => ClassifyOutput::ok(site.clone(), detection),
            Err(e) => {
                error!("Classification failed for site {}: {e}", site.site_id);
                ClassifyOutput::failed(site.clone(), e.to_string())
            }
        }
    }

    async fn execute(&self, site: &Site, fetch: &FetchRecord) -> StepResult<Detection> {
        if site.site_id.is_empty() || fetch.blob_key.is_empty() {
            return Err(StepError::ValidationError(
                "Missing required fields: site_id or blob_key".to_string(),
            ));
        }

        let bytes = self.blobs.get_object(&fetch.blob_key).await?;
        let html = String::from_utf8_lossy(&bytes);

        let found = match structural::detect(
            &html,
            &site.selectors,
            self.config.promotion_text_limit,
        ) {
            Some(structural_match) => {
                info!(
                    "Promotion found structurally for {} via {:?}",
                    site.site_id, structural_match.selector
                );
                Some((
                    structural_match.text,
                    DetectionMethod::Structural,
                    Some(structural_match.selector),
                    structural_match.confidence,
                ))
            }
            None => self
                .model_tier(site, &html)
                .await
                .map(|detection: ModelDetection| {
                    info!("Promotion found by model tier for {}", site.site_id);
                    (
                        truncate_chars(&detection.text, self.config.promotion_text_limit),
                        DetectionMethod::ModelBased,
                        None,
                        detection.confidence,
                    )
                }),
        };

        let Some((text, method, selector, confidence)) = found else {
            info!("No promotion detected for {}", site.site_id);
            return Ok(Detection::none());
        };

        let promotion = Promotion {
            promotion_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            site_id: site.site_id.clone(),
            text,
            method,
            selector,
            confidence,
            blob_key: fetch.blob_key.clone(),
            active: true,
        };
        self.store.put_promotion(&promotion).await?;

        Ok(Detection {
            found: true,
            promotion_id: Some(promotion.promotion_id),
            text: Some(promotion.text),
            confidence: Some(promotion.confidence),
            method: Some(method),
        })
    }

    /// Tier 2. Never returns an error: a missing key, a dead endpoint or a
    /// garbage response all mean "nothing found".
    async fn model_tier(&self, site: &Site, html: &str) -> Option<ModelDetection> {
        let model = self.model.as_ref()?;

        let api_key = match self.secrets.get_secret(MODEL_API_KEY).await {
            Ok(api_key) => api_key,
            Err(e) => {
                warn!("Model tier skipped for {}: {e}", site.site_id);
                return None;
            }
        };

        let text = visible_text(html);
        model.classify(&site.name, &text, &api_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecrets;
    use crate::store::{MemoryBlobStore, MemoryStore};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn site_with_selectors(selectors: &[&str]) -> Site {
        Site {
            site_id: "s1".to_string(),
            name: "Test Shop".to_string(),
            url: "https://x.test".to_string(),
            enabled: true,
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn fetch_record(blob_key: &str) -> FetchRecord {
        FetchRecord {
            blob_key: blob_key.to_string(),
            timestamp: Utc::now(),
            content_length: 0,
            duration_seconds: 0.1,
            method: crate::model::FetchMethod::DirectHttp,
            cost: dec!(0),
        }
    }

    async fn seeded_blobs(html: &str) -> MemoryBlobStore {
        let blobs = MemoryBlobStore::new();
        blobs
            .put_object("scrapes/s1/page.html", html.as_bytes(), "text/html")
            .await
            .unwrap();
        blobs
    }

    fn step_without_model(
        store: &MemoryStore,
        blobs: &MemoryBlobStore,
    ) -> ClassifyStep {
        let config = PipelineConfig::default().with_model_fallback(false);
        ClassifyStep::new(
            &config,
            Arc::new(StaticSecrets::new()),
            Arc::new(store.clone()),
            Arc::new(blobs.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn structural_match_persists_promotion() {
        let store = MemoryStore::new();
        let blobs = seeded_blobs(r#"<div class="promo">50% off</div>"#).await;
        let step = step_without_model(&store, &blobs);

        let output = step
            .run(&site_with_selectors(&[".promo"]), &fetch_record("scrapes/s1/page.html"))
            .await;
        assert_eq!(output.status, 200);
        let detection = output.detection.unwrap();
        assert!(detection.found);
        assert_eq!(detection.text.as_deref(), Some("50% off"));
        assert_eq!(detection.confidence, Some(dec!(0.9)));
        assert_eq!(detection.method, Some(DetectionMethod::Structural));

        let promotions = store.promotions();
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].text, "50% off");
        assert_eq!(promotions[0].method, DetectionMethod::Structural);
        assert_eq!(promotions[0].selector.as_deref(), Some(".promo"));
        assert_eq!(promotions[0].confidence, dec!(0.9));
        assert!(promotions[0].active);
        assert_eq!(promotions[0].blob_key, "scrapes/s1/page.html");
    }

    #[tokio::test]
    async fn no_match_and_no_model_is_a_clean_negative() {
        let store = MemoryStore::new();
        let blobs = seeded_blobs("<div>nothing on sale</div>").await;
        let step = step_without_model(&store, &blobs);

        let output = step
            .run(&site_with_selectors(&[".promo"]), &fetch_record("scrapes/s1/page.html"))
            .await;
        assert_eq!(output.status, 200);
        assert!(!output.detection.unwrap().found);
        assert!(store.promotions().is_empty());
    }

    #[tokio::test]
    async fn model_tier_runs_when_selectors_miss() {
        let server = MockServer::start().await;
        let payload = json!({
            "promotion_found": true,
            "promotion_text": "Buy two get one free",
            "confidence": 0.85,
            "reasoning": "explicit offer"
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": payload.to_string() } }
                ]
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let blobs = seeded_blobs("<div>Buy two get one free this week</div>").await;
        let config = PipelineConfig::default()
            .with_model_endpoint(format!("{}/v1/chat", server.uri()));
        let step = ClassifyStep::new(
            &config,
            Arc::new(StaticSecrets::new().with(MODEL_API_KEY, "sk-test")),
            Arc::new(store.clone()),
            Arc::new(blobs.clone()),
        )
        .unwrap();

        let output = step
            .run(&site_with_selectors(&[".promo"]), &fetch_record("scrapes/s1/page.html"))
            .await;
        let detection = output.detection.unwrap();
        assert!(detection.found);
        assert_eq!(detection.method, Some(DetectionMethod::ModelBased));
        assert_eq!(detection.confidence, Some(dec!(0.85)));

        let promotions = store.promotions();
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].method, DetectionMethod::ModelBased);
        assert!(promotions[0].selector.is_none());
    }

    #[tokio::test]
    async fn model_failure_is_not_a_step_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let blobs = seeded_blobs("<div>maybe a deal?</div>").await;
        let config = PipelineConfig::default()
            .with_model_endpoint(format!("{}/v1/chat", server.uri()));
        let step = ClassifyStep::new(
            &config,
            Arc::new(StaticSecrets::new().with(MODEL_API_KEY, "sk-test")),
            Arc::new(store.clone()),
            Arc::new(blobs.clone()),
        )
        .unwrap();

        let output = step
            .run(&site_with_selectors(&[]), &fetch_record("scrapes/s1/page.html"))
            .await;
        assert_eq!(output.status, 200);
        assert!(!output.detection.unwrap().found);
    }

    #[tokio::test]
    async fn missing_blob_is_a_failure_envelope() {
        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let step = step_without_model(&store, &blobs);

        let output = step
            .run(&site_with_selectors(&[".promo"]), &fetch_record("scrapes/s1/gone.html"))
            .await;
        assert_eq!(output.status, 500);
        assert!(output.error.is_some());
    }

    #[tokio::test]
    async fn missing_blob_key_fails_validation() {
        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new();
        let step = step_without_model(&store, &blobs);

        let output = step
            .run(&site_with_selectors(&[".promo"]), &fetch_record(""))
            .await;
        assert_eq!(output.status, 500);
        assert!(output.error.unwrap().contains("Missing required fields"));
    }
}
