//! Client side of the service control surface.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::Notification;
use crate::error::GeoCamError;
use crate::events::PollingMode;
use crate::upload_queue::{QueueItem, UploadStatus};

/// Requests understood by the service dispatcher. Each carries the reply slot.
#[derive(Debug)]
pub(crate) enum ServiceRequest {
    AddToUploadQueue {
        item: QueueItem,
        reply: oneshot::Sender<usize>,
    },
    IsUploading {
        reply: oneshot::Sender<bool>,
    },
    GetUploadQueue {
        reply: oneshot::Sender<Vec<QueueItem>>,
    },
    LastUploadStatus {
        reply: oneshot::Sender<i32>,
    },
    ApplicationVisible {
        reply: oneshot::Sender<PollingMode>,
    },
    ApplicationInvisible {
        reply: oneshot::Sender<PollingMode>,
    },
    Status {
        reply: oneshot::Sender<UploadStatus>,
    },
    PollingInterval {
        reply: oneshot::Sender<Duration>,
    },
}

/// Cloneable handle UI surfaces use to talk to a running service.
///
/// Every call fails with [`GeoCamError::ServiceUnavailable`] once the service
/// has shut down.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    requests: mpsc::Sender<ServiceRequest>,
    notifications: watch::Receiver<Notification>,
}

impl ServiceHandle {
    pub(crate) fn new(
        requests: mpsc::Sender<ServiceRequest>,
        notifications: watch::Receiver<Notification>,
    ) -> Self {
        Self {
            requests,
            notifications,
        }
    }

    /// Append `item` to the queue. Returns the queue length after the append.
    pub async fn add_to_upload_queue(
        &self,
        item: impl Into<QueueItem>,
    ) -> Result<usize, GeoCamError> {
        let item = item.into();
        self.call("add_to_upload_queue", |reply| {
            ServiceRequest::AddToUploadQueue { item, reply }
        })
        .await
    }

    pub async fn is_uploading(&self) -> Result<bool, GeoCamError> {
        self.call("is_uploading", |reply| ServiceRequest::IsUploading { reply })
            .await
    }

    pub async fn get_upload_queue(&self) -> Result<Vec<QueueItem>, GeoCamError> {
        self.call("get_upload_queue", |reply| ServiceRequest::GetUploadQueue {
            reply,
        })
        .await
    }

    pub async fn last_upload_status(&self) -> Result<i32, GeoCamError> {
        self.call("last_upload_status", |reply| {
            ServiceRequest::LastUploadStatus { reply }
        })
        .await
    }

    pub async fn application_visible(&self) -> Result<PollingMode, GeoCamError> {
        self.call("application_visible", |reply| {
            ServiceRequest::ApplicationVisible { reply }
        })
        .await
    }

    pub async fn application_invisible(&self) -> Result<PollingMode, GeoCamError> {
        self.call("application_invisible", |reply| {
            ServiceRequest::ApplicationInvisible { reply }
        })
        .await
    }

    pub async fn status(&self) -> Result<UploadStatus, GeoCamError> {
        self.call("status", |reply| ServiceRequest::Status { reply })
            .await
    }

    /// Current polling cadence for UI refresh.
    pub async fn polling_interval(&self) -> Result<Duration, GeoCamError> {
        self.call("polling_interval", |reply| ServiceRequest::PollingInterval {
            reply,
        })
        .await
    }

    /// Latest status notification.
    pub fn notification(&self) -> Notification {
        *self.notifications.borrow()
    }

    /// Receiver that resolves `changed()` whenever the notification changes.
    pub fn notifications(&self) -> watch::Receiver<Notification> {
        self.notifications.clone()
    }

    async fn call<R>(
        &self,
        operation: &str,
        request: impl FnOnce(oneshot::Sender<R>) -> ServiceRequest,
    ) -> Result<R, GeoCamError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(request(reply_tx))
            .await
            .map_err(|_| unavailable(operation))?;
        reply_rx.await.map_err(|_| unavailable(operation))
    }
}

fn unavailable(operation: &str) -> GeoCamError {
    GeoCamError::ServiceUnavailable(format!("{}: upload service is not running", operation))
}
