use serde::{Deserialize, Serialize};
use thiserror::Error;

use hydrowatch_metadata::MetadataError;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    ObservationFetch(#[from] ObservationFetchError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// The archive listing for one device could not be obtained.
///
/// Carried as a value so that one failed device never aborts the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("observation fetch failed: {message}")]
pub struct ObservationFetchError {
    pub message: String,
}

impl ObservationFetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
