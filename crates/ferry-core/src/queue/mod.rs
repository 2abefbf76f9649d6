//! Queue module: upload jobs and the shared work queue.

mod job;
mod memory;

pub use job::{JobId, UploadJob};
pub use memory::InMemoryJobQueue;

use std::time::Duration;

use async_trait::async_trait;

/// Snapshot of the queue bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Waiting for a worker.
    pub queued: usize,
    /// Handed to a worker, not yet acknowledged.
    pub in_flight: usize,
    /// Uploaded and acknowledged.
    pub uploaded: usize,
    /// Abandoned by a crashed worker.
    pub failed: usize,
}

impl QueueCounts {
    /// No job is waiting or being processed.
    pub fn is_drained(&self) -> bool {
        self.queued == 0 && self.in_flight == 0
    }
}

/// Queue port (interface).
///
/// One producer and any number of workers use the queue concurrently.
/// Delivery is at-most-once: a dequeued job belongs to the caller that got it.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job. Never blocks on capacity.
    async fn enqueue(&self, job: UploadJob);

    /// Take the oldest job, waiting at most `timeout` for one to arrive.
    async fn dequeue(&self, timeout: Duration) -> Option<UploadJob>;

    /// Mark a dequeued job as fully processed.
    async fn acknowledge(&self, job: &UploadJob);

    /// Mark a dequeued job as given up (its worker crashed).
    async fn abandon(&self, job: &UploadJob);

    async fn counts(&self) -> QueueCounts;
}
