use thiserror::Error;

/// GeoCam uploader errors
#[derive(Debug, Error)]
pub enum GeoCamError {
    /// Configuration file or value errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The content store has no usable entry for a queue item
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// A control call could not reach the upload service
    #[error("Upload service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Another live service holds the queue file
    #[error("Queue file is locked by another service: {0}")]
    QueueLocked(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, GeoCamError>;
}

impl<T, E: Into<GeoCamError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, GeoCamError> {
        self.map_err(|e| {
            let err: GeoCamError = e.into();
            match err {
                GeoCamError::Other(s) => GeoCamError::Other(format!("{}: {}", msg, s)),
                GeoCamError::Config(s) => GeoCamError::Config(format!("{}: {}", msg, s)),
                GeoCamError::ContentNotFound(s) => {
                    GeoCamError::ContentNotFound(format!("{}: {}", msg, s))
                }
                GeoCamError::ServiceUnavailable(s) => {
                    GeoCamError::ServiceUnavailable(format!("{}: {}", msg, s))
                }
                GeoCamError::QueueLocked(s) => GeoCamError::QueueLocked(format!("{}: {}", msg, s)),
                GeoCamError::Io(e) => {
                    GeoCamError::Io(std::io::Error::new(e.kind(), format!("{}: {}", msg, e)))
                }
                GeoCamError::Json(e) => GeoCamError::Json(e),
                GeoCamError::Http(e) => GeoCamError::Http(e),
            }
        })
    }
}
