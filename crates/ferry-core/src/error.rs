use std::path::PathBuf;

use thiserror::Error;

use crate::provider::ProviderError;

pub type Result<T> = std::result::Result<T, FerryError>;

#[derive(Debug, Error)]
pub enum FerryError {
    /// Invalid configuration (bad field values, unreadable config file, ...).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("the upload pipeline is already started")]
    AlreadyStarted,

    #[error("the upload pipeline has not been started")]
    NotStarted,

    #[error("the upload pipeline is shut down")]
    ShutDown,

    #[error("num_workers must be >= 1, got {0}. Blocking uploads are not supported.")]
    InvalidWorkerCount(usize),

    /// Copying an artifact into the staging directory failed.
    #[error("failed to stage {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object name format: {0}")]
    ObjectName(String),

    #[error("{uri} already exists, but overwrite was disallowed")]
    ObjectExists { uri: String },

    /// Non-transient provider failure while uploading.
    #[error("upload to {uri} failed: {source}")]
    Upload {
        uri: String,
        #[source]
        source: ProviderError,
    },

    #[error("upload to {uri} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        uri: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("upload worker {worker} crashed: {reason}")]
    WorkerCrashed { worker: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
