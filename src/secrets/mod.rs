use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use crate::core::{StepError, StepResult};

/// Names of the secrets the pipeline consumes.
pub const FALLBACK_API_KEY: &str = "fallback-api-key";
pub const MODEL_API_KEY: &str = "model-api-key";

/// Secret-retrieval seam. Implementations are injected into the steps that
/// need keys; there is no process-wide secret state.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, name: &str) -> StepResult<String>;
}

pub type DynSecrets = Arc<dyn SecretProvider>;

/// Wraps any provider with a cache scoped to this instance's lifetime, so a
/// key is resolved at most once per invocation.
pub struct CachedSecrets<P> {
    inner: P,
    cache: RwLock<HashMap<String, String>>,
}

impl<P: SecretProvider> CachedSecrets<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<P: SecretProvider> SecretProvider for CachedSecrets<P> {
    async fn get_secret(&self, name: &str) -> StepResult<String> {
        if let Some(value) = self.cache.read().get(name) {
            return Ok(value.clone());
        }
        let value = self.inner.get_secret(name).await?;
        debug!("Secret {name} resolved and cached for this invocation");
        self.cache.write().insert(name.to_string(), value.clone());
        Ok(value)
    }
}

/// Resolves secret names against environment variables
/// (`fallback-api-key` -> `PROMOWATCH_FALLBACK_API_KEY`).
pub struct EnvSecrets;

#[async_trait]
impl SecretProvider for EnvSecrets {
    async fn get_secret(&self, name: &str) -> StepResult<String> {
        let var = format!(
            "PROMOWATCH_{}",
            name.replace('-', "_").to_ascii_uppercase()
        );
        std::env::var(&var)
            .map_err(|_| StepError::SecretError(format!("Secret {name} not found (env {var})")))
    }
}

/// Fixed-map provider for tests and local wiring.
#[derive(Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn get_secret(&self, name: &str) -> StepResult<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| StepError::SecretError(format!("Secret {name} not found")))
    }
}
