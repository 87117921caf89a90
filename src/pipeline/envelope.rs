use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{DetectionMethod, FetchRecord, Prediction, Site};

/// Step boundary records. Every step returns one of these normally — failures
/// are carried as a status-500 envelope, never as a panic or a bare error, so
/// the orchestrator's branch logic can decide what to skip.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSitesOutput {
    pub status: u16,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListSitesOutput {
    pub fn ok(sites: Vec<Site>) -> Self {
        Self {
            status: 200,
            sites,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: 500,
            sites: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutput {
    pub status: u16,
    /// The site is preserved even on failure for downstream visibility.
    pub site: Site,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchOutput {
    pub fn ok(site: Site, fetch: FetchRecord) -> Self {
        Self {
            status: 200,
            site,
            fetch: Some(fetch),
            error: None,
        }
    }

    pub fn failed(site: Site, error: String) -> Self {
        Self {
            status: 500,
            site,
            fetch: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// What the Classifier concluded. `found: false` is a valid outcome, not an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<DetectionMethod>,
}

impl Detection {
    pub fn none() -> Self {
        Self {
            found: false,
            promotion_id: None,
            text: None,
            confidence: None,
            method: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyOutput {
    pub status: u16,
    pub site: Site,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassifyOutput {
    pub fn ok(site: Site, detection: Detection) -> Self {
        Self {
            status: 200,
            site,
            detection: Some(detection),
            error: None,
        }
    }

    pub fn failed(site: Site, error: String) -> Self {
        Self {
            status: 500,
            site,
            detection: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub status: u16,
    pub site_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForecastOutput {
    pub fn ok(site_id: String, prediction: Prediction) -> Self {
        Self {
            status: 200,
            site_id,
            prediction: Some(prediction),
            error: None,
        }
    }

    pub fn failed(site_id: String, error: String) -> Self {
        Self {
            status: 500,
            site_id,
            prediction: None,
            error: Some(error),
        }
    }
}
