use log::{info, warn};
use rand::seq::IndexedRandom;
use reqwest::{Client, ClientBuilder};
use tokio::time::sleep;
use url::Url;

use crate::core::{PipelineConfig, StepError, StepResult};

/// Tier-1 fetcher: a plain GET with a rotated user agent, fixed timeout and
/// exponential backoff. Timeouts get at most one retry so the time-bounded
/// fallback tier is reached quickly; other transport errors use the full
/// retry budget.
pub struct DirectFetcher {
    client: Client,
    config: PipelineConfig,
}

impl DirectFetcher {
    pub fn new(config: &PipelineConfig) -> StepResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn pick_user_agent(&self) -> &str {
        self.config
            .user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or("promowatch/0.1")
    }

    pub async fn fetch(&self, url: &Url) -> StepResult<String> {
        let max_retries = self.config.max_retries.max(1);

        for attempt in 0..max_retries {
            let sent = self
                .client
                .get(url.clone())
                .header("User-Agent", self.pick_user_agent())
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                )
                .header("Accept-Language", "en-GB,en;q=0.9")
                .send()
                .await
                .and_then(|response| response.error_for_status());

            // The body read shares the request timeout: a server that returns
            // headers and then stalls the body must hit the same fail-fast
            // rule as one that never responds.
            let result = match sent {
                Ok(response) => response.text().await,
                Err(e) => Err(e),
            };

            match result {
                Ok(body) => {
                    info!("Direct fetch succeeded for {url} on attempt {}", attempt + 1);
                    return Ok(body);
                }
                Err(e) if e.is_timeout() => {
                    warn!("Direct fetch attempt {} timed out for {url}", attempt + 1);
                    // Fail fast on timeouts: one retry at most.
                    if attempt >= 1 {
                        return Err(StepError::FetchError(format!(
                            "Read timeout after {} attempts: {e}",
                            attempt + 1
                        )));
                    }
                    sleep(self.config.backoff_delay(attempt)).await;
                }
                Err(e) => {
                    warn!("Direct fetch attempt {} failed for {url}: {e}", attempt + 1);
                    if attempt + 1 >= max_retries {
                        return Err(StepError::FetchError(format!(
                            "Failed to fetch {url} after {max_retries} attempts: {e}"
                        )));
                    }
                    sleep(self.config.backoff_delay(attempt)).await;
                }
            }
        }

        Err(StepError::FetchError(format!(
            "Failed to fetch {url}: retry budget was zero"
        )))
    }
}
