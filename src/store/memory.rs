use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::base::{BlobStore, Datastore, StoreError, StoreResult};
use crate::model::{Metric, Prediction, Promotion, Site};

/// In-memory datastore, used by tests and local single-run invocations.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryTables>>,
}

#[derive(Default)]
struct MemoryTables {
    sites: HashMap<String, Site>,
    metrics: Vec<Metric>,
    promotions: Vec<Promotion>,
    prediction_history: Vec<Prediction>,
    latest_predictions: HashMap<String, Prediction>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_site(&self, site: Site) {
        self.inner.write().sites.insert(site.site_id.clone(), site);
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.inner.read().metrics.clone()
    }

    pub fn promotions(&self) -> Vec<Promotion> {
        self.inner.read().promotions.clone()
    }

    pub fn prediction_history(&self, site_id: &str) -> Vec<Prediction> {
        self.inner
            .read()
            .prediction_history
            .iter()
            .filter(|p| p.site_id == site_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn enabled_sites(&self) -> StoreResult<Vec<Site>> {
        let tables = self.inner.read();
        let mut sites: Vec<Site> = tables.sites.values().filter(|s| s.enabled).cloned().collect();
        sites.sort_by(|a, b| a.site_id.cmp(&b.site_id));
        Ok(sites)
    }

    async fn get_site(&self, site_id: &str) -> StoreResult<Option<Site>> {
        Ok(self.inner.read().sites.get(site_id).cloned())
    }

    async fn put_metric(&self, metric: &Metric) -> StoreResult<()> {
        self.inner.write().metrics.push(metric.clone());
        Ok(())
    }

    async fn put_promotion(&self, promotion: &Promotion) -> StoreResult<()> {
        self.inner.write().promotions.push(promotion.clone());
        Ok(())
    }

    async fn promotions_for_site(
        &self,
        site_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Promotion>> {
        let tables = self.inner.read();
        let mut matching: Vec<Promotion> = tables
            .promotions
            .iter()
            .filter(|p| p.site_id == site_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn put_prediction(&self, prediction: &Prediction) -> StoreResult<()> {
        let mut tables = self.inner.write();
        tables.prediction_history.push(prediction.clone());
        tables
            .latest_predictions
            .insert(prediction.site_id.clone(), prediction.clone());
        Ok(())
    }

    async fn latest_prediction(&self, site_id: &str) -> StoreResult<Option<Prediction>> {
        Ok(self.inner.read().latest_predictions.get(site_id).cloned())
    }
}

/// In-memory blob store keyed by path.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, key: &str, bytes: &[u8], _content_type: &str) -> StoreResult<()> {
        self.objects.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::OperationError(format!("No such object: {key}")))
    }

    async fn list_by_prefix(&self, prefix: &str, max_keys: usize) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.truncate(max_keys);
        Ok(keys)
    }
}
