//! Upload worker.
//!
//! Runs the per-item procedure against the queue head, one item at a time,
//! and moves between Idle, Uploading, Backoff, and Stopped.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::{QueueItem, UploadStatus, WorkerState, STATUS_NONE};
use super::upload::{
    classify_status, process_upload_item, RetryStrategy, UploadOutcome, UploadTarget,
    UploadTransport,
};
use super::UploadQueue;
use crate::content_store::ContentStore;
use crate::events::{EventBus, UploadEventPayload};
use crate::shutdown::ShutdownSignal;

/// Worker state shared with the control surface.
#[derive(Debug)]
pub struct WorkerStatus {
    state: AtomicU8,
    last_status: AtomicI32,
}

impl WorkerStatus {
    /// Starts out Stopped until a worker picks it up.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Stopped as u8),
            last_status: AtomicI32::new(STATUS_NONE),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True only while a transfer is in flight; Backoff does not count.
    pub fn is_uploading(&self) -> bool {
        self.state() == WorkerState::Uploading
    }

    /// Status of the most recent attempt, or 0 if none has run yet.
    pub fn last_status(&self) -> i32 {
        self.last_status.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, queue_length: usize) -> UploadStatus {
        let worker_state = self.state();
        UploadStatus {
            is_uploading: worker_state == WorkerState::Uploading,
            queue_length,
            last_http_status: self.last_status(),
            worker_state,
        }
    }

    fn set_state(&self, state: WorkerState) -> WorkerState {
        WorkerState::from_u8(self.state.swap(state as u8, Ordering::SeqCst))
    }

    fn set_last_status(&self, status: i32) {
        self.last_status.store(status, Ordering::SeqCst);
    }
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Single consumer of the upload queue
pub struct UploadProcessor<C, T> {
    queue: UploadQueue,
    content_store: Arc<C>,
    transport: Arc<T>,
    target: UploadTarget,
    retry: RetryStrategy,
    status: Arc<WorkerStatus>,
    event_bus: EventBus,
}

impl<C, T> UploadProcessor<C, T>
where
    C: ContentStore,
    T: UploadTransport,
{
    pub fn new(
        queue: UploadQueue,
        content_store: Arc<C>,
        transport: Arc<T>,
        target: UploadTarget,
        retry: RetryStrategy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            queue,
            content_store,
            transport,
            target,
            retry,
            status: Arc::new(WorkerStatus::new()),
            event_bus,
        }
    }

    /// Shared view of the worker state and last status.
    pub fn status(&self) -> Arc<WorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Spawn the worker. It runs until `shutdown` fires.
    pub fn start(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                queue_length = self.queue.size(),
                url = %self.target.url,
                "Upload worker started"
            );
            self.run_loop(shutdown).await;
            info!(queue_length = self.queue.size(), "Upload worker stopped");
        })
    }

    async fn run_loop(&self, mut shutdown: ShutdownSignal) {
        let mut failed_attempts: u32 = 0;

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let item = match self.queue.peek_head() {
                Some(item) => item,
                None => {
                    self.transition(WorkerState::Idle);
                    tokio::select! {
                        _ = self.queue.wait_for_item() => {}
                        _ = shutdown.wait() => {}
                    }
                    continue;
                }
            };

            self.transition(WorkerState::Uploading);
            debug!(item = %item, attempt = failed_attempts + 1, "Uploading queue head");

            let outcome = tokio::select! {
                outcome = process_upload_item(
                    &item,
                    &self.content_store,
                    self.transport.as_ref(),
                    &self.target,
                ) => Some(outcome),
                _ = shutdown.wait() => None,
            };

            let Some(outcome) = outcome else {
                info!(item = %item, "Abandoning in-flight upload, item stays queued");
                break;
            };

            match outcome {
                UploadOutcome::Uploaded { status } => {
                    failed_attempts = 0;
                    self.status.set_last_status(status);
                    self.remove_head(&item).await;
                    info!(
                        item = %item,
                        status,
                        queue_length = self.queue.size(),
                        "Upload confirmed"
                    );
                    self.event_bus
                        .publish(UploadEventPayload::ItemUploaded { item, status });
                }
                UploadOutcome::Dropped { reason } => {
                    failed_attempts = 0;
                    self.remove_head(&item).await;
                    warn!(item = %item, reason = %reason, "Dropping unresolvable queue item");
                    self.event_bus
                        .publish(UploadEventPayload::ItemDropped { item, reason });
                }
                UploadOutcome::Failed { status } => {
                    failed_attempts = failed_attempts.saturating_add(1);
                    self.status.set_last_status(status);
                    self.report_failure(item, status, failed_attempts);

                    self.transition(WorkerState::Backoff);
                    tokio::select! {
                        _ = sleep(self.retry.backoff(failed_attempts)) => {}
                        _ = shutdown.wait() => {}
                    }
                }
            }
        }

        self.transition(WorkerState::Stopped);
    }

    /// The queue file rewrite blocks, so it runs on the blocking pool.
    async fn remove_head(&self, item: &QueueItem) {
        if let Err(e) = self.queue.remove_head_blocking().await {
            error!(item = %item, error = %e, "Failed to remove queue head");
        }
    }

    fn report_failure(&self, item: QueueItem, status: i32, attempt: u32) {
        let delay = self.retry.backoff(attempt);
        warn!(
            item = %item,
            status,
            attempt,
            error_type = ?classify_status(status),
            retry_in_secs = delay.as_secs_f64(),
            "Upload failed, will retry"
        );
        self.event_bus.publish(UploadEventPayload::UploadFailed {
            item,
            status,
            attempt,
        });
    }

    /// Record `state` and publish it. Repeated Idle is swallowed since a
    /// stale wake permit can bring the worker back to an empty queue.
    fn transition(&self, state: WorkerState) {
        let previous = self.status.set_state(state);
        if previous == WorkerState::Idle && state == WorkerState::Idle {
            return;
        }

        let queue_length = self.queue.size();
        let last_status = self.status.last_status();
        debug!(from = %previous, to = %state, queue_length, last_status, "Worker state changed");
        self.event_bus.publish(UploadEventPayload::WorkerStateChanged {
            state,
            queue_length,
            last_status,
        });
    }
}
