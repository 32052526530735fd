use tokio::sync::watch;

/// Coordinates shutdown of the upload worker and the service dispatcher
///
/// Built on a `watch` channel so a subscriber created after `shutdown()`
/// still observes the stop request.
///
/// Usage:
/// ```no_run
/// use geocam_uploader::shutdown::ShutdownCoordinator;
///
/// # async fn example() {
/// let coordinator = ShutdownCoordinator::new();
///
/// let mut signal = coordinator.subscribe();
/// tokio::spawn(async move {
///     loop {
///         if signal.is_shutdown() {
///             break;
///         }
///         tokio::select! {
///             _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
///             _ = signal.wait() => break,
///         }
///     }
/// });
///
/// coordinator.shutdown();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    shutdown_tx: watch::Sender<bool>,
}

/// Receiving side handed to each long-running task
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    shutdown_rx: watch::Receiver<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            shutdown_rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// True once shutdown was requested or every coordinator has been dropped.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow() || self.shutdown_rx.has_changed().is_err()
    }

    /// Resolve once shutdown has been requested (immediately if it already was).
    pub async fn wait(&mut self) {
        // An Err means the coordinator is gone, which also ends the task.
        let _ = self.shutdown_rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shutdown_signal() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();

        let task = tokio::spawn(async move {
            signal.wait().await;
            "shutdown received"
        });

        coordinator.shutdown();

        let result = timeout(Duration::from_millis(100), task).await;
        assert_eq!(result.unwrap().unwrap(), "shutdown received");
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();

        let mut signal = coordinator.subscribe();
        assert!(signal.is_shutdown());
        assert!(timeout(Duration::from_millis(100), signal.wait()).await.is_ok());
    }

    #[test]
    fn test_clone() {
        let coordinator1 = ShutdownCoordinator::new();
        let coordinator2 = coordinator1.clone();

        let signal = coordinator1.subscribe();
        assert!(!signal.is_shutdown());

        coordinator2.shutdown();
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_coordinator_counts_as_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let clone = coordinator.clone();
        let mut signal = coordinator.subscribe();

        drop(coordinator);
        assert!(!signal.is_shutdown(), "a live clone keeps the signal open");

        drop(clone);
        assert!(signal.is_shutdown());
        assert!(timeout(Duration::from_millis(100), signal.wait()).await.is_ok());
    }
}
