//! Long-lived upload service.
//!
//! Owns one durable queue and one worker, keeps the status notification
//! current, and answers control requests from [`ServiceHandle`]s.

mod handle;
mod notification;

pub use handle::ServiceHandle;
pub use notification::Notification;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GeoCamConfig;
use crate::content_store::ContentStore;
use crate::error::GeoCamError;
use crate::events::{EventBus, EventReceiver, NotificationHandler, PollingMode, UploadEventPayload};
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::upload_queue::upload::{Credentials, RetryStrategy, UploadTarget, UploadTransport};
use crate::upload_queue::{lock_queue_file, UploadProcessor, UploadQueue, WorkerStatus};
use handle::ServiceRequest;

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const EVENT_BUS_CAPACITY: usize = 256;

/// Everything a service needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub queue_file: PathBuf,
    pub target: UploadTarget,
    pub retry: RetryStrategy,
    pub foreground_poll: Duration,
    pub background_poll: Duration,
}

impl ServiceSettings {
    pub fn new(queue_file: impl Into<PathBuf>, target: UploadTarget) -> Self {
        let defaults = GeoCamConfig::default();
        Self {
            queue_file: queue_file.into(),
            target,
            retry: RetryStrategy::fixed(defaults.retry_delay()),
            foreground_poll: defaults.foreground_poll_interval(),
            background_poll: defaults.background_poll_interval(),
        }
    }

    pub fn from_config(config: &GeoCamConfig) -> Result<Self, GeoCamError> {
        let credentials = config.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: config.password.clone().unwrap_or_default(),
        });

        Ok(Self {
            queue_file: config.queue_file_path()?,
            target: UploadTarget {
                url: config.upload_url()?,
                credentials,
            },
            retry: RetryStrategy::fixed(config.retry_delay()),
            foreground_poll: config.foreground_poll_interval(),
            background_poll: config.background_poll_interval(),
        })
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_intervals(mut self, foreground: Duration, background: Duration) -> Self {
        self.foreground_poll = foreground;
        self.background_poll = background;
        self
    }
}

/// A running upload service.
///
/// Dropping it without calling [`UploadService::shutdown`] still stops the
/// background tasks, but does not wait for them.
pub struct UploadService {
    handle: ServiceHandle,
    queue: UploadQueue,
    event_bus: EventBus,
    shutdown: ShutdownCoordinator,
    notifier_shutdown: ShutdownCoordinator,
    worker: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    notifier: JoinHandle<()>,
    _queue_lock: File,
}

impl UploadService {
    /// Load the persisted queue and spawn the worker, dispatcher, and
    /// notification tasks. Must be called from within a tokio runtime.
    pub fn start<C, T>(
        settings: ServiceSettings,
        content_store: Arc<C>,
        transport: Arc<T>,
    ) -> Result<Self, GeoCamError>
    where
        C: ContentStore,
        T: UploadTransport,
    {
        let queue_lock = lock_queue_file(&settings.queue_file)?;
        let queue = UploadQueue::open(&settings.queue_file);
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let shutdown = ShutdownCoordinator::new();
        // Stopped only after the worker has published its final transition
        let notifier_shutdown = ShutdownCoordinator::new();

        let (notification_tx, notification_rx) = watch::channel(Notification::default());
        let notifier = NotificationHandler::new(
            event_bus.clone(),
            notifier_shutdown.clone(),
            notification_tx,
        )
        .start();

        let processor = UploadProcessor::new(
            queue.clone(),
            content_store,
            transport,
            settings.target.clone(),
            settings.retry,
            event_bus.clone(),
        );
        let worker_status = processor.status();
        let worker = processor.start(shutdown.subscribe());

        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let dispatcher = Dispatcher {
            queue: queue.clone(),
            worker_status,
            event_bus: event_bus.clone(),
            visible_surfaces: 0,
            foreground_poll: settings.foreground_poll,
            background_poll: settings.background_poll,
        }
        .start(request_rx, shutdown.subscribe());

        info!(
            queue_file = %settings.queue_file.display(),
            queue_length = queue.size(),
            "Upload service started"
        );

        Ok(Self {
            handle: ServiceHandle::new(request_tx, notification_rx),
            queue,
            event_bus,
            shutdown,
            notifier_shutdown,
            worker,
            dispatcher,
            notifier,
            _queue_lock: queue_lock,
        })
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    /// Subscribe to worker and queue events from this point on.
    pub fn events(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn queue_file(&self) -> &Path {
        self.queue.queue_file()
    }

    /// Stop the worker and the dispatcher and wait for both. An in-flight
    /// transfer is abandoned; its item stays at the head of the persisted queue.
    pub async fn shutdown(self) -> Result<(), GeoCamError> {
        info!(queue_length = self.queue.size(), "Shutting down upload service");
        self.shutdown.shutdown();

        self.worker
            .await
            .map_err(|e| GeoCamError::Other(format!("Upload worker task failed: {}", e)))?;
        self.dispatcher
            .await
            .map_err(|e| GeoCamError::Other(format!("Service dispatcher task failed: {}", e)))?;

        self.notifier_shutdown.shutdown();
        self.notifier
            .await
            .map_err(|e| GeoCamError::Other(format!("Notification task failed: {}", e)))?;

        info!("Upload service stopped");
        Ok(())
    }
}

/// Serves control requests; the only place the visible-surface count lives.
struct Dispatcher {
    queue: UploadQueue,
    worker_status: Arc<WorkerStatus>,
    event_bus: EventBus,
    visible_surfaces: usize,
    foreground_poll: Duration,
    background_poll: Duration,
}

impl Dispatcher {
    fn start(
        mut self,
        mut requests: mpsc::Receiver<ServiceRequest>,
        mut shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = requests.recv() => match request {
                        Some(request) => self.handle_request(request).await,
                        None => break,
                    },
                    _ = shutdown.wait() => break,
                }
            }
            debug!("Service dispatcher stopped");
        })
    }

    async fn handle_request(&mut self, request: ServiceRequest) {
        // A caller that gave up on its reply is not an error
        match request {
            ServiceRequest::AddToUploadQueue { item, reply } => {
                match self.queue.enqueue_blocking(item.clone()).await {
                    Ok(queue_length) => {
                        info!(item = %item, queue_length, "Added to upload queue");
                        self.event_bus
                            .publish(UploadEventPayload::ItemEnqueued { item, queue_length });
                        let _ = reply.send(queue_length);
                    }
                    // Dropping the reply surfaces as ServiceUnavailable to the caller
                    Err(e) => error!(item = %item, error = %e, "Failed to add to upload queue"),
                }
            }
            ServiceRequest::IsUploading { reply } => {
                let _ = reply.send(self.worker_status.is_uploading());
            }
            ServiceRequest::GetUploadQueue { reply } => {
                let _ = reply.send(self.queue.snapshot());
            }
            ServiceRequest::LastUploadStatus { reply } => {
                let _ = reply.send(self.worker_status.last_status());
            }
            ServiceRequest::ApplicationVisible { reply } => {
                let before = self.polling_mode();
                self.visible_surfaces += 1;
                self.report_mode_change(before);
                let _ = reply.send(self.polling_mode());
            }
            ServiceRequest::ApplicationInvisible { reply } => {
                let before = self.polling_mode();
                if self.visible_surfaces == 0 {
                    warn!("application_invisible with no visible surface, ignoring");
                } else {
                    self.visible_surfaces -= 1;
                    self.report_mode_change(before);
                }
                let _ = reply.send(self.polling_mode());
            }
            ServiceRequest::Status { reply } => {
                let _ = reply.send(self.worker_status.snapshot(self.queue.size()));
            }
            ServiceRequest::PollingInterval { reply } => {
                let _ = reply.send(self.polling_interval());
            }
        }
    }

    fn polling_mode(&self) -> PollingMode {
        if self.visible_surfaces > 0 {
            PollingMode::Foreground
        } else {
            PollingMode::Background
        }
    }

    fn polling_interval(&self) -> Duration {
        match self.polling_mode() {
            PollingMode::Foreground => self.foreground_poll,
            PollingMode::Background => self.background_poll,
        }
    }

    fn report_mode_change(&self, before: PollingMode) {
        let mode = self.polling_mode();
        if mode == before {
            return;
        }
        let interval_ms = self.polling_interval().as_millis() as u64;
        info!(?mode, interval_ms, visible = self.visible_surfaces, "Polling mode changed");
        self.event_bus
            .publish(UploadEventPayload::PollingModeChanged { mode, interval_ms });
    }
}
