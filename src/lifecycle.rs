//! Foreground/background binding for a single UI surface.

use tracing::{debug, info};

use crate::error::GeoCamError;
use crate::events::PollingMode;
use crate::service::ServiceHandle;

/// Tracks whether one UI surface is bound to the service as visible.
///
/// Call [`LifecycleTracker::foreground`] when the surface becomes visible and
/// [`LifecycleTracker::background`] when it is hidden. Each tracker counts
/// at most once toward the service's visible-surface total.
#[derive(Debug)]
pub struct LifecycleTracker {
    surface: String,
    binding: Option<ServiceHandle>,
}

impl LifecycleTracker {
    pub fn new(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            binding: None,
        }
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Bind to `service` and mark this surface visible.
    pub async fn foreground(&mut self, service: &ServiceHandle) -> Result<(), GeoCamError> {
        if self.binding.is_some() {
            debug!(surface = %self.surface, "Already in foreground, ignoring");
            return Ok(());
        }

        let mode = service.application_visible().await?;
        self.binding = Some(service.clone());
        info!(surface = %self.surface, mode = ?mode, "Surface in foreground");
        Ok(())
    }

    /// Mark this surface hidden and unbind. No-op when not bound.
    pub async fn background(&mut self) -> Result<Option<PollingMode>, GeoCamError> {
        let Some(service) = self.binding.take() else {
            debug!(surface = %self.surface, "Not bound, nothing to background");
            return Ok(None);
        };

        let mode = service.application_invisible().await?;
        info!(surface = %self.surface, mode = ?mode, "Surface in background");
        Ok(Some(mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::{ContentStore, PhotoRecord};
    use crate::service::{ServiceSettings, UploadService};
    use crate::upload_queue::upload::{UploadRequest, UploadTarget, UploadTransport};
    use crate::upload_queue::QueueItem;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    struct EmptyStore;

    impl ContentStore for EmptyStore {
        fn lookup(&self, item: &QueueItem) -> Result<PhotoRecord, GeoCamError> {
            Err(GeoCamError::ContentNotFound(item.to_string()))
        }
    }

    struct NoTransport;

    impl UploadTransport for NoTransport {
        async fn post(&self, _request: UploadRequest) -> i32 {
            -1
        }
    }

    fn start_service(dir: &tempfile::TempDir) -> UploadService {
        let settings = ServiceSettings::new(
            dir.path().join("queue.json"),
            UploadTarget {
                url: "http://127.0.0.1:9/upload/".to_string(),
                credentials: None,
            },
        )
        .with_poll_intervals(Duration::from_millis(250), Duration::from_secs(30));
        UploadService::start(settings, Arc::new(EmptyStore), Arc::new(NoTransport)).unwrap()
    }

    #[tokio::test]
    async fn test_background_without_binding_is_noop() {
        let mut tracker = LifecycleTracker::new("camera");
        assert_eq!(tracker.background().await.unwrap(), None);
        assert!(!tracker.is_bound());
    }

    #[tokio::test]
    async fn test_foreground_then_background() {
        let dir = tempdir().unwrap();
        let service = start_service(&dir);
        let handle = service.handle();

        let mut tracker = LifecycleTracker::new("camera");
        tracker.foreground(&handle).await.unwrap();
        assert!(tracker.is_bound());
        assert_eq!(handle.polling_interval().await.unwrap(), Duration::from_millis(250));

        assert_eq!(
            tracker.background().await.unwrap(),
            Some(PollingMode::Background)
        );
        assert!(!tracker.is_bound());
        assert_eq!(handle.polling_interval().await.unwrap(), Duration::from_secs(30));

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_foreground_counts_once() {
        let dir = tempdir().unwrap();
        let service = start_service(&dir);
        let handle = service.handle();

        let mut camera = LifecycleTracker::new("camera");
        let mut map = LifecycleTracker::new("map");
        camera.foreground(&handle).await.unwrap();
        camera.foreground(&handle).await.unwrap();
        map.foreground(&handle).await.unwrap();

        // Camera hidden, map still visible
        assert_eq!(
            camera.background().await.unwrap(),
            Some(PollingMode::Foreground)
        );
        assert_eq!(map.background().await.unwrap(), Some(PollingMode::Background));

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_background_after_service_stopped() {
        let dir = tempdir().unwrap();
        let service = start_service(&dir);
        let handle = service.handle();

        let mut tracker = LifecycleTracker::new("settings");
        tracker.foreground(&handle).await.unwrap();
        service.shutdown().await.unwrap();

        let err = tracker.background().await.unwrap_err();
        assert!(matches!(err, GeoCamError::ServiceUnavailable(_)));
        assert!(!tracker.is_bound());
    }
}
