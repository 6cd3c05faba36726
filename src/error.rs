//! Error types for Quotaguard.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Quotaguard operations.
#[derive(Error, Debug)]
pub enum QuotaguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task errors (no runtime available, etc.)
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Quotaguard operations.
pub type Result<T> = std::result::Result<T, QuotaguardError>;

/// Returned when a rate-limited action is rejected because its quota is used up.
///
/// This is an expected outcome rather than a fault: the caller may retry once
/// `retry_after` has elapsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("quota exceeded for {policy} key {key:?}, retry after {retry_after_minutes} minute(s)")]
pub struct QuotaExceeded {
    /// Key prefix of the policy that rejected the action
    pub policy: String,
    /// Caller key, without the policy prefix
    pub key: String,
    /// Exact time left in the current window
    pub retry_after: Duration,
    /// `retry_after` rounded up to whole minutes
    pub retry_after_minutes: u64,
}

impl QuotaExceeded {
    /// Build the rejection for a key whose window resets in `retry_after`.
    pub fn new(policy: &str, key: &str, retry_after: Duration) -> Self {
        let millis = retry_after.as_millis() as u64;
        Self {
            policy: policy.to_string(),
            key: key.to_string(),
            retry_after,
            retry_after_minutes: millis.div_ceil(60_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up_to_minutes() {
        let err = QuotaExceeded::new("form", "a@b.c", Duration::from_millis(60_001));
        assert_eq!(err.retry_after_minutes, 2);

        let err = QuotaExceeded::new("form", "a@b.c", Duration::from_millis(60_000));
        assert_eq!(err.retry_after_minutes, 1);

        let err = QuotaExceeded::new("form", "a@b.c", Duration::from_millis(1));
        assert_eq!(err.retry_after_minutes, 1);
    }

    #[test]
    fn test_retry_after_zero() {
        let err = QuotaExceeded::new("api", "k", Duration::ZERO);
        assert_eq!(err.retry_after_minutes, 0);
    }

    #[test]
    fn test_quota_exceeded_display() {
        let err = QuotaExceeded::new("auth", "user:7", Duration::from_secs(90));
        assert_eq!(
            err.to_string(),
            "quota exceeded for auth key \"user:7\", retry after 2 minute(s)"
        );
    }
}
