use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Metric, Prediction, Promotion, Site};

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    ConnectionError(String),

    #[error("Store operation error: {0}")]
    OperationError(String),

    #[error("Store serialization error: {0}")]
    SerializationError(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The item-store seam: put-item plus the indexed queries the pipeline needs.
/// Each invocation owns its own handle; no cross-invocation state is assumed.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// All sites with enabled=true. A failure here is a failure of the whole
    /// listing step; a silently short list is never acceptable.
    async fn enabled_sites(&self) -> StoreResult<Vec<Site>>;

    async fn get_site(&self, site_id: &str) -> StoreResult<Option<Site>>;

    async fn put_metric(&self, metric: &Metric) -> StoreResult<()>;

    async fn put_promotion(&self, promotion: &Promotion) -> StoreResult<()>;

    /// Promotions for one site, most recent first, at most `limit`.
    async fn promotions_for_site(&self, site_id: &str, limit: usize)
        -> StoreResult<Vec<Promotion>>;

    /// Appends to prediction history and replaces the site's latest slot in
    /// one operation, so exactly one latest prediction is discoverable.
    async fn put_prediction(&self, prediction: &Prediction) -> StoreResult<()>;

    async fn latest_prediction(&self, site_id: &str) -> StoreResult<Option<Prediction>>;
}

/// The blob-store seam: content bodies keyed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) -> StoreResult<()>;

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>>;

    async fn list_by_prefix(&self, prefix: &str, max_keys: usize) -> StoreResult<Vec<String>>;
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::SerializationError(error.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::OperationError(error.to_string())
    }
}
