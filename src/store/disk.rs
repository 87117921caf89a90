use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Error;
use async_trait::async_trait;

use super::base::{BlobStore, Datastore, StoreError, StoreResult};
use crate::model::{Metric, Prediction, Promotion, Site};

/// JSON-file datastore for local runs. One directory per table, one file per
/// record; queries read the directory back. Not built for scale, built for
/// inspectability.
#[derive(Clone)]
pub struct DiskStore {
    base_path: PathBuf,
}

impl DiskStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, Error> {
        let base_path = base_path.as_ref().to_path_buf();
        for table in ["sites", "metrics", "promotions", "predictions"] {
            fs::create_dir_all(base_path.join(table))?;
        }
        Ok(Self { base_path })
    }

    pub fn seed_site(&self, site: &Site) -> StoreResult<()> {
        let path = self
            .base_path
            .join("sites")
            .join(format!("{}.json", safe_name(&site.site_id)));
        fs::write(path, serde_json::to_string_pretty(site)?)?;
        Ok(())
    }

    fn read_dir_records<T: serde::de::DeserializeOwned>(&self, dir: &Path) -> StoreResult<Vec<T>> {
        let mut records = Vec::new();
        if !dir.exists() {
            return Ok(records);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let contents = fs::read_to_string(&path)?;
                records.push(serde_json::from_str(&contents)?);
            }
        }
        Ok(records)
    }
}

fn safe_name(raw: &str) -> String {
    raw.replace(['/', ':'], "-")
}

#[async_trait]
impl Datastore for DiskStore {
    async fn enabled_sites(&self) -> StoreResult<Vec<Site>> {
        let mut sites: Vec<Site> = self
            .read_dir_records::<Site>(&self.base_path.join("sites"))?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();
        sites.sort_by(|a, b| a.site_id.cmp(&b.site_id));
        Ok(sites)
    }

    async fn get_site(&self, site_id: &str) -> StoreResult<Option<Site>> {
        let path = self
            .base_path
            .join("sites")
            .join(format!("{}.json", safe_name(site_id)));
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn put_metric(&self, metric: &Metric) -> StoreResult<()> {
        let path = self
            .base_path
            .join("metrics")
            .join(format!("{}.json", safe_name(&metric.metric_id)));
        fs::write(path, serde_json::to_string_pretty(metric)?)?;
        Ok(())
    }

    async fn put_promotion(&self, promotion: &Promotion) -> StoreResult<()> {
        let dir = self
            .base_path
            .join("promotions")
            .join(safe_name(&promotion.site_id));
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", safe_name(&promotion.promotion_id)));
        fs::write(path, serde_json::to_string_pretty(promotion)?)?;
        Ok(())
    }

    async fn promotions_for_site(
        &self,
        site_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Promotion>> {
        let dir = self.base_path.join("promotions").join(safe_name(site_id));
        let mut promotions: Vec<Promotion> = self.read_dir_records(&dir)?;
        promotions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        promotions.truncate(limit);
        Ok(promotions)
    }

    async fn put_prediction(&self, prediction: &Prediction) -> StoreResult<()> {
        let dir = self
            .base_path
            .join("predictions")
            .join(safe_name(&prediction.site_id));
        fs::create_dir_all(dir.join("history"))?;

        let json = serde_json::to_string_pretty(prediction)?;
        let history_name = format!(
            "{}.json",
            safe_name(&prediction.predicted_at.to_rfc3339())
        );
        fs::write(dir.join("history").join(history_name), &json)?;
        // The latest slot is a single file, replaced wholesale.
        fs::write(dir.join("latest.json"), &json)?;
        Ok(())
    }

    async fn latest_prediction(&self, site_id: &str) -> StoreResult<Option<Prediction>> {
        let path = self
            .base_path
            .join("predictions")
            .join(safe_name(site_id))
            .join("latest.json");
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

/// Blob store backed by the filesystem; keys map to relative paths.
#[derive(Clone)]
pub struct DiskBlobStore {
    base_path: PathBuf,
}

impl DiskBlobStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, Error> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put_object(&self, key: &str, bytes: &[u8], _content_type: &str) -> StoreResult<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(key);
        if !path.exists() {
            return Err(StoreError::OperationError(format!("No such object: {key}")));
        }
        Ok(fs::read(path)?)
    }

    async fn list_by_prefix(&self, prefix: &str, max_keys: usize) -> StoreResult<Vec<String>> {
        let dir = self.resolve(prefix);
        let mut keys = Vec::new();
        if !dir.exists() {
            return Ok(keys);
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                keys.push(format!(
                    "{}{}",
                    prefix,
                    entry.file_name().to_string_lossy()
                ));
            }
        }
        keys.sort();
        keys.truncate(max_keys);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PredictionMethod;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn disk_store_filters_and_sorts_sites() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();

        for (id, enabled) in [("beta", true), ("alpha", true), ("gamma", false)] {
            store
                .seed_site(&Site {
                    site_id: id.to_string(),
                    name: id.to_string(),
                    url: format!("https://{id}.test"),
                    enabled,
                    selectors: vec![],
                })
                .unwrap();
        }

        let sites = store.enabled_sites().await.unwrap();
        let ids: Vec<&str> = sites.iter().map(|s| s.site_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn disk_latest_prediction_slot_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();

        let mut prediction = Prediction {
            site_id: "s1".to_string(),
            predicted_at: Utc::now(),
            predicted_date: Utc::now(),
            days_until_next: 30,
            method: PredictionMethod::Heuristic,
            confidence: dec!(0.3),
            data_points: 0,
        };
        store.put_prediction(&prediction).await.unwrap();

        prediction.predicted_at = Utc::now() + chrono::Duration::seconds(1);
        prediction.days_until_next = 12;
        store.put_prediction(&prediction).await.unwrap();

        let latest = store.latest_prediction("s1").await.unwrap().unwrap();
        assert_eq!(latest.days_until_next, 12);
        assert_eq!(latest.confidence, dec!(0.3));
    }

    #[tokio::test]
    async fn disk_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = DiskBlobStore::new(dir.path()).unwrap();

        blobs
            .put_object("scrapes/s1/page.html", b"<html>hi</html>", "text/html")
            .await
            .unwrap();
        assert_eq!(
            blobs.get_object("scrapes/s1/page.html").await.unwrap(),
            b"<html>hi</html>"
        );
        let keys = blobs.list_by_prefix("scrapes/s1/", 5).await.unwrap();
        assert_eq!(keys, vec!["scrapes/s1/page.html".to_string()]);
    }
}
