use std::sync::Arc;

use promowatch::core::PipelineConfig;
use promowatch::pipeline::Pipeline;
use promowatch::secrets::{CachedSecrets, EnvSecrets};
use promowatch::store::{DiskBlobStore, DiskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .filter_module("selectors", log::LevelFilter::Warn)
        .filter_module("html5ever", log::LevelFilter::Error)
        .init();

    let config = PipelineConfig::from_env();

    let store = Arc::new(DiskStore::new("data/store")?);
    let blobs = Arc::new(DiskBlobStore::new("data/blobs")?);
    let secrets = Arc::new(CachedSecrets::new(EnvSecrets));

    let pipeline = Pipeline::new(&config, secrets, store, blobs)?;
    let summary = pipeline.run().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
