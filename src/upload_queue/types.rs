//! Type definitions for the upload queue system.
//!
//! Defines core data structures: QueueItem, WorkerState, UploadStatus, and status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP status of a confirmed upload.
pub const STATUS_OK: i32 = 200;

/// No upload has been attempted since the service started.
pub const STATUS_NONE: i32 = 0;

/// Connection refused, timeout, or any failure before an HTTP status arrived.
pub const STATUS_TRANSPORT_ERROR: i32 = -1;

/// HTTP 200 without the confirmation marker for the uploaded file.
pub const STATUS_UNCONFIRMED: i32 = -2;

/// Opaque reference to a pending upload (a content store key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItem(String);

impl QueueItem {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueItem {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

impl From<String> for QueueItem {
    fn from(reference: String) -> Self {
        Self(reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    /// Queue empty, waiting for a wake signal
    Idle = 0,
    /// One transfer of the head item in flight
    Uploading = 1,
    /// Last attempt failed, sleeping before retrying the same head
    Backoff = 2,
    /// Worker has ended
    Stopped = 3,
}

impl WorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Uploading,
            2 => WorkerState::Backoff,
            _ => WorkerState::Stopped,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Uploading => "uploading",
            WorkerState::Backoff => "backoff",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub is_uploading: bool,
    pub queue_length: usize,
    pub last_http_status: i32,
    pub worker_state: WorkerState,
}

impl Default for UploadStatus {
    fn default() -> Self {
        Self {
            is_uploading: false,
            queue_length: 0,
            last_http_status: STATUS_NONE,
            worker_state: WorkerState::Idle,
        }
    }
}
