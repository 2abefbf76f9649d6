//! In-memory queue implementation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{JobId, JobQueue, QueueCounts, UploadJob};

#[derive(Default)]
struct InMemoryQueueState {
    /// Ready queue, FIFO.
    ready: VecDeque<UploadJob>,

    /// Jobs handed to a worker and not yet acknowledged or abandoned.
    in_flight: HashSet<JobId>,

    uploaded: usize,
    failed: usize,
}

impl InMemoryQueueState {
    fn counts(&self) -> QueueCounts {
        QueueCounts {
            queued: self.ready.len(),
            in_flight: self.in_flight.len(),
            uploaded: self.uploaded,
            failed: self.failed,
        }
    }
}

/// Unbounded FIFO queue guarded by a tokio mutex.
///
/// `enqueue` wakes one waiting `dequeue` through a [`Notify`]; a notification
/// sent while nobody waits is kept as a permit, so a job pushed between a
/// worker's empty check and its wait is never missed.
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: UploadJob) {
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(job);
        }
        // ロック外で通知する
        self.notify.notify_one();
    }

    async fn dequeue(&self, timeout: Duration) -> Option<UploadJob> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(job) = state.ready.pop_front() {
                    state.in_flight.insert(job.id());
                    let more = !state.ready.is_empty();
                    drop(state);
                    // Pass the wake-up on so other idle workers see the rest.
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(job);
                }
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    async fn acknowledge(&self, job: &UploadJob) {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&job.id()) {
            state.uploaded += 1;
        }
    }

    async fn abandon(&self, job: &UploadJob) {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&job.id()) {
            state.failed += 1;
        }
    }

    async fn counts(&self) -> QueueCounts {
        self.state.lock().await.counts()
    }
}
