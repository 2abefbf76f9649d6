//! ferry-core
//!
//! Background upload of locally produced artifacts to an object store.
//!
//! # モジュール構成
//! - **pipeline**: producer 向けの façade（start / submit / check_health / shutdown）と upload worker
//! - **queue**: UploadJob と共有キュー（JobQueue trait + InMemoryJobQueue）
//! - **provider**: オブジェクトストアの抽象化（ObjectStore, ProviderFactory）とローカル実装
//! - **retry**: backoff と transient / permanent の分類
//! - **staging**: アップロード待ちファイルのローカルコピー
//! - **naming**: object name のテンプレート
//! - **config**: PipelineConfig
//! - **error**: エラー型

pub mod config;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod provider;
pub mod queue;
pub mod retry;
pub mod staging;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{PipelineConfig, RetryConfig};
pub use error::{FerryError, Result};
pub use naming::{ObjectNameFormat, RunContext};
pub use pipeline::{UploadPipeline, WorkerState};
pub use provider::{LocalObjectStore, LocalStoreFactory, ObjectStore, ProviderError, ProviderFactory};
pub use queue::{InMemoryJobQueue, JobId, JobQueue, QueueCounts, UploadJob};
pub use retry::{RetryPolicy, TransientClassifier};
