use std::sync::Arc;

use log::{error, info};

use super::ListSitesOutput;
use crate::store::Datastore;

/// The Site Lister step. Any datastore failure fails the whole listing — a
/// silently short site list is worse than a failed run.
pub struct ListSitesStep {
    store: Arc<dyn Datastore>,
}

impl ListSitesStep {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    pub async fn run(&self) -> ListSitesOutput {
        match self.store.enabled_sites().await {
            Ok(sites) => {
                info!("Retrieved {} enabled site(s)", sites.len());
                ListSitesOutput::ok(sites)
            }
            Err(e) => {
                error!("Site listing failed: {e}");
                ListSitesOutput::failed(e.to_string())
            }
        }
    }
}
