use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A monitored retail site. Created and edited out-of-band; the pipeline
/// only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Site {
    pub site_id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    /// Structural selectors for fast promotion detection, in priority order.
    #[serde(default)]
    pub selectors: Vec<String>,
}

/// Which tier produced the fetched content.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    DirectHttp,
    FallbackAfterError,
    FallbackViaPolicyBlock,
}

impl FetchMethod {
    pub fn is_paid(self) -> bool {
        !matches!(self, FetchMethod::DirectHttp)
    }
}

/// The outcome of one successful fetch, handed from the Fetcher to the
/// Classifier. Never persisted as its own entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub blob_key: String,
    pub timestamp: DateTime<Utc>,
    pub content_length: usize,
    pub duration_seconds: f64,
    pub method: FetchMethod,
    pub cost: Decimal,
}

/// Append-only record of one fetch attempt. Written once, never read back by
/// the pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub metric_id: String,
    pub timestamp: DateTime<Utc>,
    pub site_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<FetchMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    pub cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retention hint honored by the store backend (~90 days).
    pub expires_at: DateTime<Utc>,
}

impl Metric {
    pub fn id_for(site_id: &str, timestamp: DateTime<Utc>) -> String {
        format!("{}_{}", site_id, timestamp.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DetectionMethod {
    #[serde(rename = "structural")]
    Structural,
    #[serde(rename = "model-based")]
    ModelBased,
}

/// A detected promotional event. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub promotion_id: String,
    pub timestamp: DateTime<Utc>,
    pub site_id: String,
    /// Truncated to the configured limit (500 chars), never rejected.
    pub text: String,
    pub method: DetectionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub confidence: Decimal,
    pub blob_key: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PredictionMethod {
    #[serde(rename = "heuristic")]
    Heuristic,
    #[serde(rename = "weighted-interval")]
    WeightedInterval,
}

/// A forecast for a site's next promotion. The latest prediction per site is
/// kept discoverable through the datastore's latest slot; older predictions
/// stay in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub site_id: String,
    pub predicted_at: DateTime<Utc>,
    pub predicted_date: DateTime<Utc>,
    pub days_until_next: i64,
    pub method: PredictionMethod,
    pub confidence: Decimal,
    pub data_points: usize,
}

/// Truncate `text` to at most `limit` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
