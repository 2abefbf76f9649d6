//! UploadPipeline - producer-facing façade over the queue and the worker pool.
//!
//! # フロー
//! 1. `start()` で staging area を用意し、ワーカーを N 本起動
//! 2. `submit()` で artifact を staging にコピーしてキューに積む
//! 3. `check_health()` を定期的に呼んでワーカーのクラッシュを検出（fail-fast）
//! 4. `shutdown()` で shutdown signal を立て、キューが空になるまで待って join
//!
//! # 使用例
//! ```ignore
//! let mut pipeline = UploadPipeline::new(PipelineConfig::default(), Arc::new(factory))?;
//! pipeline.start(RunContext::new("run1")).await?;
//! pipeline.submit("metrics.json", Path::new("out/metrics.json"), true).await?;
//! pipeline.check_health()?;
//! pipeline.shutdown().await?;
//! ```

mod worker;

pub use worker::WorkerState;

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{FerryError, Result};
use crate::naming::{CREDENTIALS_MARKER_ARTIFACT, ObjectNameFormat, RunContext};
use crate::provider::{ProviderFactory, object_uri};
use crate::queue::{InMemoryJobQueue, JobQueue, QueueCounts, UploadJob};
use crate::retry::TransientClassifier;
use crate::staging::StagingArea;
use worker::{WorkerContext, WorkerHandle, spawn_worker};

const CREDENTIALS_MARKER: &[u8] = b"credentials_validated_successfully";

enum Phase {
    Idle,
    Running {
        run: RunContext,
        shutdown_tx: watch::Sender<bool>,
        workers: Vec<WorkerHandle>,
        staging: Arc<StagingArea>,
    },
    Stopped {
        run: Option<RunContext>,
    },
}

pub struct UploadPipeline {
    config: PipelineConfig,
    factory: Arc<dyn ProviderFactory>,
    format: ObjectNameFormat,
    classifier: TransientClassifier,
    queue: Arc<dyn JobQueue>,
    phase: Phase,
}

impl UploadPipeline {
    /// Validate `config` and prepare a pipeline. Nothing runs until [`start`](Self::start).
    pub fn new(config: PipelineConfig, factory: Arc<dyn ProviderFactory>) -> Result<Self> {
        config.validate()?;
        let format = ObjectNameFormat::parse(&config.object_name_format)?;
        let classifier = config.classifier();
        Ok(Self {
            config,
            factory,
            format,
            classifier,
            queue: Arc::new(InMemoryJobQueue::new()),
            phase: Phase::Idle,
        })
    }

    /// Replace the default status-code rule for transient errors.
    pub fn with_classifier(mut self, classifier: TransientClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// Start the worker pool. Can be called once per pipeline.
    pub async fn start(&mut self, run: RunContext) -> Result<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(FerryError::AlreadyStarted);
        }
        if self.config.num_workers < 1 {
            return Err(FerryError::InvalidWorkerCount(self.config.num_workers));
        }

        let staging = StagingArea::new(self.config.staging_dir.as_deref()).await?;

        if self.config.validate_credentials {
            let marker = self.format.render(&run, CREDENTIALS_MARKER_ARTIFACT);
            if let Err(e) = self.validate_credentials(&marker).await {
                if let Err(cleanup) = staging.release().await {
                    warn!(error = %cleanup, "failed to release staging directory");
                }
                return Err(e);
            }
        }

        let staging = Arc::new(staging);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&self.queue),
            factory: Arc::clone(&self.factory),
            retry: self.config.retry.to_policy(),
            classifier: self.classifier.clone(),
            poll_interval: self.config.poll_interval(),
            staging: Arc::clone(&staging),
        });
        let workers = (0..self.config.num_workers)
            .map(|id| spawn_worker(id, Arc::clone(&ctx), shutdown_rx.clone()))
            .collect();

        info!(
            run = %run.run_name,
            workers = self.config.num_workers,
            staging = %staging.path().display(),
            format = self.format.as_str(),
            provider = self.factory.provider_name(),
            container = self.factory.container_name(),
            "upload pipeline started"
        );
        self.phase = Phase::Running {
            run,
            shutdown_tx,
            workers,
            staging,
        };
        Ok(())
    }

    async fn validate_credentials(&self, marker: &str) -> Result<()> {
        let store = self.factory.connect()?;
        store
            .upload_bytes(Bytes::from_static(CREDENTIALS_MARKER), marker)
            .await?;
        Ok(())
    }

    /// Stage `path` and queue it for upload as `artifact_name`.
    ///
    /// Blocks only for the local copy; the upload happens in the background.
    pub async fn submit(&self, artifact_name: &str, path: &Path, overwrite: bool) -> Result<()> {
        let (run, staging) = match &self.phase {
            Phase::Running { run, staging, .. } => (run, staging),
            Phase::Idle => return Err(FerryError::NotStarted),
            Phase::Stopped { .. } => return Err(FerryError::ShutDown),
        };

        let object_name = self.format.render(run, artifact_name);
        let staged = staging.stage(path).await?;
        let job = UploadJob::new(staged, object_name, overwrite);
        debug!(
            job = %job.id(),
            artifact = artifact_name,
            object = job.object_name(),
            "queued upload"
        );
        self.queue.enqueue(job).await;
        Ok(())
    }

    /// Fail if any worker has crashed.
    ///
    /// Meant to be called at frequent checkpoints (every step, every epoch) so a
    /// crash surfaces promptly. A reported crash is not reported again by
    /// [`shutdown`](Self::shutdown).
    pub fn check_health(&mut self) -> Result<()> {
        let Phase::Running { workers, .. } = &mut self.phase else {
            return Ok(());
        };
        for worker in workers.iter_mut() {
            if let Some(reason) = worker.crash_reason() {
                worker.mark_crash_reported();
                return Err(FerryError::WorkerCrashed {
                    worker: worker.id(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// States of all workers, in spawn order. Empty unless running.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        match &self.phase {
            Phase::Running { workers, .. } => workers.iter().map(WorkerHandle::state).collect(),
            _ => Vec::new(),
        }
    }

    pub async fn counts(&self) -> QueueCounts {
        self.queue.counts().await
    }

    /// Signal shutdown, wait for every worker to drain the queue and exit, then
    /// release an owned staging directory.
    ///
    /// Returns the first crash that was not already surfaced by
    /// [`check_health`](Self::check_health). Calling it again is a no-op.
    pub async fn shutdown(&mut self) -> Result<()> {
        let (run, shutdown_tx, mut workers, staging) =
            match std::mem::replace(&mut self.phase, Phase::Stopped { run: None }) {
                Phase::Running {
                    run,
                    shutdown_tx,
                    workers,
                    staging,
                } => (run, shutdown_tx, workers, staging),
                other => {
                    self.phase = other;
                    return Ok(());
                }
            };

        info!(run = %run.run_name, "shutting down upload pipeline");
        shutdown_tx.send_replace(true);

        let mut unreported = None;
        for worker in workers.iter_mut() {
            if let WorkerState::Crashed(reason) = worker.join().await
                && !worker.crash_reported()
                && unreported.is_none()
            {
                unreported = Some(FerryError::WorkerCrashed {
                    worker: worker.id(),
                    reason,
                });
            }
        }

        let counts = self.queue.counts().await;
        info!(
            uploaded = counts.uploaded,
            failed = counts.failed,
            left = counts.queued,
            "upload workers joined"
        );

        // Joined workers have dropped their context, so this is the last reference.
        let staging_result = match Arc::try_unwrap(staging) {
            Ok(staging) => staging.release().await,
            Err(staging) => {
                warn!(
                    staging = %staging.path().display(),
                    "staging area still shared after join; removing it on last drop"
                );
                Ok(())
            }
        };
        self.phase = Phase::Stopped { run: Some(run) };

        if let Some(err) = unreported {
            return Err(err);
        }
        staging_result
    }

    /// Object name for `artifact_name` under the current run.
    pub fn object_name(&self, artifact_name: &str) -> Result<String> {
        let run = match &self.phase {
            Phase::Running { run, .. } | Phase::Stopped { run: Some(run) } => run,
            _ => return Err(FerryError::NotStarted),
        };
        Ok(self.format.render(run, artifact_name))
    }

    /// `"{provider}://{container}/{object_name}"` for `artifact_name`. No I/O.
    pub fn resolve_uri(&self, artifact_name: &str) -> Result<String> {
        let object_name = self.object_name(artifact_name)?;
        Ok(object_uri(
            self.factory.provider_name(),
            self.factory.container_name(),
            &object_name,
        ))
    }
}

impl Drop for UploadPipeline {
    fn drop(&mut self) {
        if let Phase::Running { shutdown_tx, .. } = &self.phase {
            // Workers keep draining in the background and hold the staging
            // area until the last one exits; nobody joins them.
            warn!("upload pipeline dropped without shutdown()");
            shutdown_tx.send_replace(true);
        }
    }
}
