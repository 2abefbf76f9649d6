//! Provider port - リモートのオブジェクトストア（S3/GCS/Local）
//!
//! The pipeline treats the object store as an opaque backend. Each upload worker
//! owns exactly one [`ObjectStore`] handle, built from a shared [`ProviderFactory`].
//!
//! # 実装
//! - **LocalObjectStore**: ローカルディレクトリをバケットとして扱う（demo / tests 用）

mod local;

pub use local::{LocalObjectStore, LocalStoreFactory};

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors reported by a provider.
///
/// The variants carry enough information for [`crate::retry::TransientClassifier`]
/// to decide whether an upload is worth retrying.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The object does not exist (the expected answer of an overwrite check).
    #[error("object not found: {0}")]
    NotFound(String),

    /// The backend answered with an error status code.
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// Anything the backend says cannot be fixed by retrying.
    #[error("{0}")]
    Permanent(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// Connection to one container of a remote object store.
///
/// Concurrent use of a single handle is not assumed to be safe by the pipeline,
/// so handles are never shared between workers. `Send + Sync` is still required
/// so a handle can live inside a spawned task.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Provider identity, used as the URI scheme (e.g. `s3`, `gs`, `file`).
    fn provider_name(&self) -> &str;

    /// Bucket / container name.
    fn container_name(&self) -> &str;

    /// Upload the whole file at `local_path` as `object_name`.
    async fn upload(&self, local_path: &Path, object_name: &str) -> Result<(), ProviderError>;

    /// Upload an in-memory buffer as `object_name`.
    async fn upload_bytes(&self, data: Bytes, object_name: &str) -> Result<(), ProviderError>;

    /// Size of an existing object, or [`ProviderError::NotFound`].
    async fn object_size(&self, object_name: &str) -> Result<u64, ProviderError>;
}

/// Builds provider handles from shared configuration.
///
/// Called once per worker when the worker starts, and once by the controller for
/// credential validation.
pub trait ProviderFactory: Send + Sync {
    fn provider_name(&self) -> &str;

    fn container_name(&self) -> &str;

    fn connect(&self) -> Result<Box<dyn ObjectStore>, ProviderError>;
}

/// `"{provider}://{container}/"`, shared by URI resolution and error messages.
pub fn uri_prefix(provider_name: &str, container_name: &str) -> String {
    format!("{provider_name}://{container_name}/")
}

/// Full object URI with any leading `/` of the object name removed.
pub fn object_uri(provider_name: &str, container_name: &str, object_name: &str) -> String {
    let mut uri = uri_prefix(provider_name, container_name);
    uri.push_str(object_name.trim_start_matches('/'));
    uri
}
