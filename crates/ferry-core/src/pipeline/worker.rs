//! Upload worker: dequeue → overwrite check → upload (with retry) → cleanup.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{FerryError, Result};
use crate::provider::{ObjectStore, ProviderError, ProviderFactory, object_uri};
use crate::queue::{JobQueue, UploadJob};
use crate::retry::{RetryPolicy, TransientClassifier};
use crate::staging::StagingArea;

/// Lifecycle of one worker as published to the controller.
///
/// - Starting -> Running -> Stopped (queue drained after shutdown)
/// - Starting | Running -> Crashed (fatal error, the job's staged file is kept)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Crashed(String),
    Stopped,
}

/// Everything a worker needs, shared read-only by all workers of a pipeline.
pub(crate) struct WorkerContext {
    pub queue: Arc<dyn JobQueue>,
    pub factory: Arc<dyn ProviderFactory>,
    pub retry: RetryPolicy,
    pub classifier: TransientClassifier,
    pub poll_interval: Duration,
    /// Held so an owned staging directory outlives every worker, even when
    /// the pipeline is dropped without a shutdown.
    pub staging: Arc<StagingArea>,
}

/// Controller-side handle of a spawned worker.
pub(crate) struct WorkerHandle {
    id: usize,
    state: watch::Receiver<WorkerState>,
    join: Option<JoinHandle<()>>,
    /// The crash was already returned to the caller by a health check.
    crash_reported: bool,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state.borrow().clone()
    }

    /// Crash reason, if the worker crashed or its task ended without
    /// reaching a terminal state (panic).
    pub fn crash_reason(&self) -> Option<String> {
        match self.state() {
            WorkerState::Crashed(reason) => Some(reason),
            WorkerState::Starting | WorkerState::Running
                if self.join.as_ref().is_some_and(JoinHandle::is_finished) =>
            {
                Some("worker exited unexpectedly".to_string())
            }
            _ => None,
        }
    }

    pub fn crash_reported(&self) -> bool {
        self.crash_reported
    }

    pub fn mark_crash_reported(&mut self) {
        self.crash_reported = true;
    }

    /// Wait for the worker task to exit. A panic is recorded as a crash.
    pub async fn join(&mut self) -> WorkerState {
        if let Some(join) = self.join.take()
            && let Err(e) = join.await
        {
            return WorkerState::Crashed(format!("worker task failed: {e}"));
        }
        self.state()
    }
}

/// Spawn worker `id` on the current tokio runtime.
pub(crate) fn spawn_worker(
    id: usize,
    ctx: Arc<WorkerContext>,
    shutdown_rx: watch::Receiver<bool>,
) -> WorkerHandle {
    let (state_tx, state_rx) = watch::channel(WorkerState::Starting);

    let join = tokio::spawn(async move {
        match worker_loop(id, &ctx, &shutdown_rx, &state_tx).await {
            Ok(()) => {
                info!(worker = id, "upload worker stopped");
                state_tx.send_replace(WorkerState::Stopped);
            }
            Err(e) => {
                error!(worker = id, error = %e, "upload worker crashed");
                state_tx.send_replace(WorkerState::Crashed(e.to_string()));
            }
        }
    });

    WorkerHandle {
        id,
        state: state_rx,
        join: Some(join),
        crash_reported: false,
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: &WorkerContext,
    shutdown_rx: &watch::Receiver<bool>,
    state_tx: &watch::Sender<WorkerState>,
) -> Result<()> {
    // provider handle はワーカーごとに 1 つ（共有しない）
    let store = ctx.factory.connect()?;
    state_tx.send_replace(WorkerState::Running);
    info!(
        worker = worker_id,
        provider = store.provider_name(),
        container = store.container_name(),
        staging = %ctx.staging.path().display(),
        "upload worker started"
    );

    loop {
        // Read the flag before polling: every job enqueued before shutdown is
        // then visible to this poll, so an empty result really means drained.
        let finished = *shutdown_rx.borrow();

        let Some(job) = ctx.queue.dequeue(ctx.poll_interval).await else {
            if finished {
                return Ok(());
            }
            debug!(worker = worker_id, "queue empty, polling again");
            continue;
        };

        match process_job(worker_id, store.as_ref(), &job, ctx).await {
            Ok(()) => ctx.queue.acknowledge(&job).await,
            Err(e) => {
                // staged file はそのまま残す（調査用）
                ctx.queue.abandon(&job).await;
                error!(
                    worker = worker_id,
                    job = %job.id(),
                    staged = %job.staged_path().display(),
                    "giving up on job; staged file kept"
                );
                return Err(e);
            }
        }
    }
}

async fn process_job(
    worker_id: usize,
    store: &dyn ObjectStore,
    job: &UploadJob,
    ctx: &WorkerContext,
) -> Result<()> {
    let uri = object_uri(store.provider_name(), store.container_name(), job.object_name());

    if !job.overwrite() {
        ensure_absent(store, job, &uri, &ctx.retry, &ctx.classifier).await?;
    }

    info!(
        worker = worker_id,
        job = %job.id(),
        staged = %job.staged_path().display(),
        object = %uri,
        "uploading file"
    );
    upload_with_retry(store, job, &uri, &ctx.retry, &ctx.classifier).await?;

    match tokio::fs::remove_file(job.staged_path()).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            worker = worker_id,
            staged = %job.staged_path().display(),
            error = %e,
            "uploaded, but could not remove staged file"
        ),
    }
    info!(worker = worker_id, job = %job.id(), object = %uri, "upload finished");
    Ok(())
}

/// Fail with [`FerryError::ObjectExists`] if the target object is already present.
pub(crate) async fn ensure_absent(
    store: &dyn ObjectStore,
    job: &UploadJob,
    uri: &str,
    policy: &RetryPolicy,
    classifier: &TransientClassifier,
) -> Result<()> {
    let existing = with_retry(policy, classifier, uri, move || async move {
        match store.object_size(job.object_name()).await {
            Ok(size) => Ok(Some(size)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await?;

    match existing {
        None => Ok(()),
        Some(_) => Err(FerryError::ObjectExists {
            uri: uri.to_string(),
        }),
    }
}

pub(crate) async fn upload_with_retry(
    store: &dyn ObjectStore,
    job: &UploadJob,
    uri: &str,
    policy: &RetryPolicy,
    classifier: &TransientClassifier,
) -> Result<()> {
    with_retry(policy, classifier, uri, move || {
        store.upload(job.staged_path(), job.object_name())
    })
    .await
}

/// Run `op` until it succeeds, fails permanently, or runs out of retries.
async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    classifier: &TransientClassifier,
    uri: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderError>>,
{
    let mut retries = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !classifier.is_transient(&err) {
            return Err(FerryError::Upload {
                uri: uri.to_string(),
                source: err,
            });
        }
        if retries >= policy.max_retries {
            return Err(FerryError::RetriesExhausted {
                uri: uri.to_string(),
                attempts: retries + 1,
                source: err,
            });
        }

        retries += 1;
        let delay = policy.next_delay(retries);
        warn!(
            object = %uri,
            attempt = retries,
            delay_secs = delay.as_secs_f64(),
            error = %err,
            "request failed, sleeping and retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
