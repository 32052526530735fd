use super::types::{EventSequence, UploadEvent, UploadEventPayload};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<UploadEvent>;
pub type EventSender = broadcast::Sender<UploadEvent>;

/// Event bus for distributing upload events
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: EventSender,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event and return its sequence number. Publishing with no
    /// subscribers is not an error; the event is simply not observed.
    pub fn publish(&self, payload: UploadEventPayload) -> EventSequence {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = UploadEvent {
            sequence,
            timestamp: Utc::now(),
            payload,
        };

        let _ = self.sender.send(event);
        sequence
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload_queue::{QueueItem, WorkerState};

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        let seq = bus.publish(UploadEventPayload::ItemEnqueued {
            item: QueueItem::new("a.jpg"),
            queue_length: 1,
        });
        assert_eq!(seq, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.worker_state(), None);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(100);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(UploadEventPayload::WorkerStateChanged {
            state: WorkerState::Backoff,
            queue_length: 3,
            last_status: 500,
        });

        let event1 = rx1.recv().await.unwrap();
        let event2 = rx2.recv().await.unwrap();

        assert_eq!(event1.sequence, event2.sequence);
        assert_eq!(event1.worker_state(), Some(WorkerState::Backoff));
    }

    #[test]
    fn test_publish_without_subscribers_still_sequences() {
        let bus = EventBus::new(100);

        let seq1 = bus.publish(UploadEventPayload::ItemEnqueued {
            item: QueueItem::new("a.jpg"),
            queue_length: 1,
        });
        let seq2 = bus.publish(UploadEventPayload::ItemEnqueued {
            item: QueueItem::new("b.jpg"),
            queue_length: 2,
        });

        assert_eq!(seq1, 1);
        assert_eq!(seq2, 2);
        assert_eq!(
            bus.publish(UploadEventPayload::ItemEnqueued {
                item: QueueItem::new("c.jpg"),
                queue_length: 3,
            }),
            3
        );
    }
}
