use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::upload_queue::{QueueItem, WorkerState};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// Everything the upload service reports to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub payload: UploadEventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEventPayload {
    /// Worker moved to a new state; published on every transition
    WorkerStateChanged {
        state: WorkerState,
        queue_length: usize,
        last_status: i32,
    },

    /// An item was appended through the control surface
    ItemEnqueued { item: QueueItem, queue_length: usize },

    /// Transfer confirmed and the item left the queue
    ItemUploaded { item: QueueItem, status: i32 },

    /// Item could not be resolved and was removed without an upload
    ItemDropped { item: QueueItem, reason: String },

    /// Transfer failed; the item stays at the head
    UploadFailed {
        item: QueueItem,
        status: i32,
        attempt: u32,
    },

    /// Foreground/background polling cadence changed
    PollingModeChanged {
        mode: PollingMode,
        interval_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingMode {
    /// At least one UI surface is visible
    Foreground,
    /// No UI surface is visible
    Background,
}

impl UploadEvent {
    /// Worker state carried by this event, if it is a transition.
    pub fn worker_state(&self) -> Option<WorkerState> {
        match &self.payload {
            UploadEventPayload::WorkerStateChanged { state, .. } => Some(*state),
            _ => None,
        }
    }
}
