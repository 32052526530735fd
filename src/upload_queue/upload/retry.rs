//! Retry policy and status classification.
//!
//! Transport failures are never final: the head item is retried after a
//! fixed delay, with no growth and no attempt limit.

use std::time::Duration;

use crate::config::DEFAULT_RETRY_DELAY_SECS;
use crate::upload_queue::types::{STATUS_OK, STATUS_TRANSPORT_ERROR, STATUS_UNCONFIRMED};

/// Classification of a failed attempt, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Client errors (400-499), e.g. bad credentials
    Client,
    /// Server errors (500-599)
    Server,
    /// No HTTP status: connection refused, timeout, I/O
    Network,
    /// HTTP 200 without the confirmation marker
    Unconfirmed,
    /// Any other non-200 status
    Unexpected,
}

/// Fixed-delay retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryStrategy {
    pub delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryStrategy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before re-attempting after `failed_attempts` consecutive failures.
    /// Constant regardless of the count.
    pub fn backoff(&self, _failed_attempts: u32) -> Duration {
        self.delay
    }
}

/// `None` for a confirmed upload, otherwise why the attempt failed.
pub fn classify_status(status: i32) -> Option<ErrorType> {
    match status {
        STATUS_OK => None,
        STATUS_UNCONFIRMED => Some(ErrorType::Unconfirmed),
        STATUS_TRANSPORT_ERROR => Some(ErrorType::Network),
        400..=499 => Some(ErrorType::Client),
        500..=599 => Some(ErrorType::Server),
        _ => Some(ErrorType::Unexpected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert_eq!(classify_status(200), None);
    }

    #[test]
    fn test_classify_failures() {
        assert_eq!(classify_status(STATUS_UNCONFIRMED), Some(ErrorType::Unconfirmed));
        assert_eq!(classify_status(STATUS_TRANSPORT_ERROR), Some(ErrorType::Network));
        assert_eq!(classify_status(401), Some(ErrorType::Client));
        assert_eq!(classify_status(404), Some(ErrorType::Client));
        assert_eq!(classify_status(500), Some(ErrorType::Server));
        assert_eq!(classify_status(503), Some(ErrorType::Server));
        assert_eq!(classify_status(201), Some(ErrorType::Unexpected));
        assert_eq!(classify_status(302), Some(ErrorType::Unexpected));
    }

    #[test]
    fn test_default_delay_is_ten_seconds() {
        assert_eq!(RetryStrategy::default().delay, Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_does_not_grow() {
        let strategy = RetryStrategy::fixed(Duration::from_millis(250));

        for attempts in [1, 2, 10, 1_000] {
            assert_eq!(strategy.backoff(attempts), Duration::from_millis(250));
        }
    }
}
