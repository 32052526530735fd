// Module declarations
mod processor;
mod queue_manager;
mod types;
pub mod upload;

pub use processor::{UploadProcessor, WorkerStatus};
pub use queue_manager::{load_queue_file, lock_queue_file, persist_queue_file};
pub use types::*;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::error::GeoCamError;

/// Durable FIFO of pending uploads.
///
/// Every mutation rewrites the queue file before returning. A failed write is
/// logged and the in-memory queue stays authoritative for this process.
/// Clones share the same queue, lock, and wake signal.
#[derive(Clone)]
pub struct UploadQueue {
    queue: Arc<Mutex<VecDeque<QueueItem>>>,
    queue_file: PathBuf,
    wake: Arc<Notify>,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("queue_file", &self.queue_file)
            .field("size", &self.size())
            .finish()
    }
}

impl UploadQueue {
    /// Open the queue backed by `queue_file`, loading whatever it holds.
    pub fn open(queue_file: impl Into<PathBuf>) -> Self {
        let queue_file = queue_file.into();
        let items = load_queue_file(&queue_file);
        debug!(path = %queue_file.display(), size = items.len(), "Loaded upload queue");

        Self {
            queue: Arc::new(Mutex::new(items)),
            queue_file,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn queue_file(&self) -> &Path {
        &self.queue_file
    }

    /// Append `item` to the tail, persist, and wake the worker. Returns the
    /// queue length after the append.
    pub fn enqueue(&self, item: QueueItem) -> usize {
        let queue_length = {
            let mut queue = self.lock();
            queue.push_back(item);
            self.persist_locked(&queue);
            queue.len()
        };
        // Single stored permit: an enqueue before the worker waits is not lost.
        self.wake.notify_one();
        queue_length
    }

    /// [`UploadQueue::enqueue`] on the blocking pool, for async callers.
    pub async fn enqueue_blocking(&self, item: QueueItem) -> Result<usize, GeoCamError> {
        let queue = self.clone();
        tokio::task::spawn_blocking(move || queue.enqueue(item))
            .await
            .map_err(|e| GeoCamError::Other(format!("Queue append task failed: {}", e)))
    }

    pub fn peek_head(&self) -> Option<QueueItem> {
        self.lock().front().cloned()
    }

    /// Remove the head and persist. Only the worker calls this, after a
    /// confirmed upload or a permanent drop of the head it peeked.
    pub fn remove_head(&self) -> Option<QueueItem> {
        let mut queue = self.lock();
        let head = queue.pop_front();
        if head.is_some() {
            self.persist_locked(&queue);
        }
        head
    }

    /// [`UploadQueue::remove_head`] on the blocking pool, for async callers.
    pub async fn remove_head_blocking(&self) -> Result<Option<QueueItem>, GeoCamError> {
        let queue = self.clone();
        tokio::task::spawn_blocking(move || queue.remove_head())
            .await
            .map_err(|e| GeoCamError::Other(format!("Queue removal task failed: {}", e)))
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Ordered copy of the current contents.
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.lock().iter().cloned().collect()
    }

    /// Rewrite the queue file from the in-memory queue.
    pub fn persist_to_disk(&self) {
        let queue = self.lock();
        self.persist_locked(&queue);
    }

    /// Wait until an enqueue has signalled the worker.
    pub(crate) async fn wait_for_item(&self) {
        self.wake.notified().await;
    }

    fn persist_locked(&self, queue: &VecDeque<QueueItem>) {
        if let Err(e) = persist_queue_file(&self.queue_file, queue) {
            error!(
                path = %self.queue_file.display(),
                size = queue.len(),
                error = %e,
                "Failed to persist upload queue, keeping in-memory state"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        // The deque is never left half-updated, so a poisoned lock is still usable.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn reload(queue: &UploadQueue) -> Vec<QueueItem> {
        Vec::from(load_queue_file(queue.queue_file()))
    }

    #[test]
    fn test_upload_queue_creation() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        assert_eq!(queue.size(), 0);
        assert!(queue.peek_head().is_none());
        assert!(queue.remove_head().is_none());
        // Removing from an empty queue does not create the file
        assert!(!queue.queue_file().exists());
    }

    #[test]
    fn test_fifo_order() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        queue.enqueue("a.jpg".into());
        queue.enqueue("b.jpg".into());
        queue.enqueue("c.jpg".into());

        assert_eq!(queue.peek_head(), Some("a.jpg".into()));
        assert_eq!(queue.size(), 3, "peek must not remove");
        assert_eq!(queue.remove_head(), Some("a.jpg".into()));
        assert_eq!(queue.remove_head(), Some("b.jpg".into()));
        assert_eq!(queue.snapshot(), vec![QueueItem::new("c.jpg")]);
    }

    #[test]
    fn test_disk_matches_memory_after_every_mutation() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        let ops: &[Option<&str>] = &[
            Some("a.jpg"),
            Some("b.jpg"),
            None,
            Some("c.jpg"),
            None,
            None,
            Some("d.jpg"),
        ];

        for op in ops {
            match op {
                Some(item) => {
                    queue.enqueue(QueueItem::new(*item));
                }
                None => {
                    queue.remove_head();
                }
            }
            assert_eq!(reload(&queue), queue.snapshot());
        }

        let reopened = UploadQueue::open(dir.path().join("queue.json"));
        assert_eq!(reopened.snapshot(), vec![QueueItem::new("d.jpg")]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        queue.enqueue("same.jpg".into());
        queue.enqueue("same.jpg".into());

        assert_eq!(queue.size(), 2);
        assert_eq!(reload(&queue).len(), 2);
    }

    #[test]
    fn test_persist_failure_keeps_memory_authoritative() {
        let dir = tempdir().unwrap();
        // A directory where the queue file should be makes every rename fail
        let queue_file = dir.path().join("queue.json");
        std::fs::create_dir(&queue_file).unwrap();
        std::fs::write(queue_file.join("occupied"), "x").unwrap();

        let queue = UploadQueue::open(&queue_file);
        queue.enqueue("a.jpg".into());
        queue.enqueue("b.jpg".into());

        assert_eq!(queue.size(), 2);
        assert_eq!(queue.remove_head(), Some("a.jpg".into()));
        assert_eq!(queue.snapshot(), vec![QueueItem::new("b.jpg")]);
    }

    #[tokio::test]
    async fn test_blocking_variants_persist() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        assert_eq!(queue.enqueue_blocking("a.jpg".into()).await.unwrap(), 1);
        assert_eq!(queue.enqueue_blocking("b.jpg".into()).await.unwrap(), 2);
        assert_eq!(reload(&queue), queue.snapshot());

        assert_eq!(
            queue.remove_head_blocking().await.unwrap(),
            Some(QueueItem::new("a.jpg"))
        );
        assert_eq!(reload(&queue), vec![QueueItem::new("b.jpg")]);

        queue.remove_head_blocking().await.unwrap();
        assert_eq!(queue.remove_head_blocking().await.unwrap(), None);
        assert!(reload(&queue).is_empty());

        // The append also leaves a wake permit for the worker
        assert!(
            tokio::time::timeout(Duration::from_secs(1), queue.wait_for_item())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        let waiter = queue.clone();
        let task = tokio::spawn(async move { waiter.wait_for_item().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("a.jpg".into());

        assert!(tokio::time::timeout(Duration::from_secs(1), task).await.is_ok());
    }

    #[tokio::test]
    async fn test_enqueue_before_wait_is_not_lost() {
        let dir = tempdir().unwrap();
        let queue = UploadQueue::open(dir.path().join("queue.json"));

        queue.enqueue("a.jpg".into());

        let waited =
            tokio::time::timeout(Duration::from_secs(1), queue.wait_for_item()).await;
        assert!(waited.is_ok());
    }
}
