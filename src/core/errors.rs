use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("Secret error: {0}")]
    SecretError(String),
}

pub type StepResult<T> = Result<T, StepError>;
