use std::env;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Built-in user agent pool for the direct fetch tier.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Pipeline-wide configuration, constructed once at invocation start and
/// passed down to every step. No module reads the environment on its own.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-request timeout for the direct fetch tier.
    pub request_timeout: Duration,
    /// Attempt budget for non-timeout transport errors in the direct tier.
    pub max_retries: usize,
    /// Backoff base: sleep `retry_backoff^attempt` seconds between attempts.
    pub retry_backoff: f32,
    pub user_agents: Vec<String>,

    /// Paid fallback scraping service.
    pub fallback_endpoint: String,
    /// Price of one fallback credit, in USD.
    pub fallback_unit_price: Decimal,
    pub fallback_timeout: Duration,

    /// Model-based detection tier.
    pub model_fallback_enabled: bool,
    pub model_endpoint: String,
    pub model_name: String,
    /// Character budget for model input, to respect the classifier's token limit.
    pub model_input_limit: usize,

    pub promotion_text_limit: usize,

    /// Forecasting.
    pub min_points_weighted: usize,
    pub history_limit: usize,
    pub default_interval_days: i64,

    /// Local fan-out.
    pub max_concurrency: usize,
    pub metric_retention: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff: 2.0,
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            fallback_endpoint: "https://api.firecrawl.dev/v2/scrape".to_string(),
            fallback_unit_price: dec!(0.0006),
            fallback_timeout: Duration::from_secs(60),
            model_fallback_enabled: true,
            model_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            model_input_limit: 12_000,
            promotion_text_limit: 500,
            min_points_weighted: 10,
            history_limit: 100,
            default_interval_days: 30,
            max_concurrency: 10,
            metric_retention: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

impl PipelineConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset. Read once at startup; the result is passed by value.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = read_env_parsed::<u64>("PROMOWATCH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = read_env_parsed::<usize>("PROMOWATCH_MAX_RETRIES") {
            config.max_retries = n;
        }
        if let Some(b) = read_env_parsed::<f32>("PROMOWATCH_RETRY_BACKOFF") {
            config.retry_backoff = b;
        }
        if let Ok(endpoint) = env::var("PROMOWATCH_FALLBACK_ENDPOINT") {
            config.fallback_endpoint = endpoint;
        }
        if let Ok(endpoint) = env::var("PROMOWATCH_MODEL_ENDPOINT") {
            config.model_endpoint = endpoint;
        }
        if let Ok(model) = env::var("PROMOWATCH_MODEL_NAME") {
            config.model_name = model;
        }
        if let Some(enabled) = read_env_parsed::<bool>("PROMOWATCH_MODEL_FALLBACK") {
            config.model_fallback_enabled = enabled;
        }
        if let Some(n) = read_env_parsed::<usize>("PROMOWATCH_MAX_CONCURRENCY") {
            config.max_concurrency = n;
        }

        config
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: f32) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_fallback_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.fallback_endpoint = endpoint.into();
        self
    }

    pub fn with_model_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.model_endpoint = endpoint.into();
        self
    }

    pub fn with_model_fallback(mut self, enabled: bool) -> Self {
        self.model_fallback_enabled = enabled;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Backoff delay before the retry following `attempt` (0-indexed).
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        Duration::from_secs_f32(self.retry_backoff.powi(attempt as i32))
    }
}

fn read_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
