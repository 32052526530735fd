//! Status indicator content derived from worker state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::upload_queue::WorkerState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Nothing to upload
    #[default]
    Idle,
    /// Uploading, `queued` items left including the one in flight
    Active { queued: usize },
    /// Last attempt failed; waiting to retry
    Paused { queued: usize, last_status: i32 },
    /// Worker has ended with `queued` items still persisted
    Stopped { queued: usize },
}

impl Notification {
    pub fn from_state(state: WorkerState, queued: usize, last_status: i32) -> Self {
        match state {
            WorkerState::Idle if queued == 0 => Notification::Idle,
            WorkerState::Idle | WorkerState::Uploading => Notification::Active { queued },
            WorkerState::Backoff => Notification::Paused {
                queued,
                last_status,
            },
            WorkerState::Stopped => Notification::Stopped { queued },
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Idle => write!(f, "Upload queue empty"),
            Notification::Active { queued } => write!(f, "Uploading: {} in queue", queued),
            Notification::Paused {
                queued,
                last_status,
            } => write!(
                f,
                "Upload paused: {} in queue (last status {})",
                queued, last_status
            ),
            Notification::Stopped { queued } => write!(f, "Uploader stopped: {} in queue", queued),
        }
    }
}
