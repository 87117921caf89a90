use log::info;
use reqwest::{Client, ClientBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{PipelineConfig, StepError, StepResult};

/// Client for the paid scraping service (firecrawl-shaped API). Used when
/// robots policy blocks the direct tier or the direct tier exhausts its
/// retries; there is no tier after this one.
pub struct FallbackClient {
    client: Client,
    endpoint: String,
    unit_price: Decimal,
}

/// Content plus what it cost us.
#[derive(Debug, Clone)]
pub struct FallbackFetch {
    pub content: String,
    pub cost: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: &'static [&'static str],
    only_main_content: bool,
    exclude_tags: &'static [&'static str],
    wait_for: u32,
}

#[derive(Deserialize)]
struct ScrapeResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default, rename = "creditsUsed")]
    credits_used: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ScrapeData {
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    raw_html: Option<String>,
}

impl ScrapeData {
    fn into_content(self) -> Option<String> {
        [self.html, self.markdown, self.raw_html]
            .into_iter()
            .flatten()
            .find(|content| !content.is_empty())
    }
}

impl FallbackClient {
    pub fn new(config: &PipelineConfig) -> StepResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.fallback_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.fallback_endpoint.clone(),
            unit_price: config.fallback_unit_price,
        })
    }

    pub async fn scrape(&self, url: &str, api_key: &str) -> StepResult<FallbackFetch> {
        let payload = ScrapeRequest {
            url,
            formats: &["html", "markdown"],
            only_main_content: true,
            exclude_tags: &["nav", "footer", "script", "style"],
            wait_for: 0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let envelope: ScrapeResponse = response.json().await?;

        if !envelope.success {
            let reason = envelope.error.unwrap_or_else(|| "Unknown error".to_string());
            return Err(StepError::ExternalError(format!(
                "Scraping service returned success=false: {reason}"
            )));
        }

        let content = envelope
            .data
            .unwrap_or_default()
            .into_content()
            .ok_or_else(|| {
                StepError::ExternalError("Scraping service returned empty content".to_string())
            })?;

        let credits = envelope.credits_used.unwrap_or(1);
        let cost = Decimal::from(credits) * self.unit_price;
        info!(
            "Fallback scrape of {url} used {credits} credit(s), cost {cost}, {} chars",
            content.len()
        );

        Ok(FallbackFetch { content, cost })
    }
}
