use super::{EventBus, UploadEvent, UploadEventPayload};
use crate::service::Notification;
use crate::shutdown::ShutdownCoordinator;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handler that keeps the status indicator in step with worker transitions
pub struct NotificationHandler {
    event_bus: EventBus,
    shutdown: ShutdownCoordinator,
    notification_tx: watch::Sender<Notification>,
}

impl NotificationHandler {
    pub fn new(
        event_bus: EventBus,
        shutdown: ShutdownCoordinator,
        notification_tx: watch::Sender<Notification>,
    ) -> Self {
        Self {
            event_bus,
            shutdown,
            notification_tx,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        // Subscribe before spawning so no transition published after start() is missed
        let mut rx = self.event_bus.subscribe();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => self.handle_event(&event),
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Notification handler stopped (event bus closed)");
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                // The next transition brings the indicator back in step
                                warn!(skipped = n, "Notification handler lagged");
                            }
                        }
                    }
                    _ = shutdown.wait() => {
                        // Drain transitions already published, e.g. the final Stopped
                        while let Ok(event) = rx.try_recv() {
                            self.handle_event(&event);
                        }
                        debug!("Notification handler shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn handle_event(&self, event: &UploadEvent) {
        if let UploadEventPayload::WorkerStateChanged {
            state,
            queue_length,
            last_status,
        } = &event.payload
        {
            let notification = Notification::from_state(*state, *queue_length, *last_status);
            let changed = self.notification_tx.send_if_modified(|current| {
                if *current == notification {
                    false
                } else {
                    *current = notification;
                    true
                }
            });
            if changed {
                info!(notification = %notification, "Status notification updated");
            }
        }
    }
}
