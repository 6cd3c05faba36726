//! Rate limit policy definition.

use std::time::Duration;

use super::catalog::PolicyName;
use crate::config::PolicySettings;
use crate::error::{QuotaguardError, Result};

/// Immutable quota configuration for one limiter.
///
/// A policy allows `max_requests` actions per key in each `window`, and
/// namespaces its keys under `key_prefix` so that two limiters never share
/// state for the same caller key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    max_requests: u64,
    window: Duration,
    key_prefix: String,
}

impl Policy {
    /// Create a new policy.
    ///
    /// # Errors
    /// Returns `QuotaguardError::Config` if `max_requests` is zero or
    /// `window` is shorter than one millisecond.
    pub fn new(max_requests: u64, window: Duration, key_prefix: impl Into<String>) -> Result<Self> {
        let key_prefix = key_prefix.into();

        if max_requests == 0 {
            return Err(QuotaguardError::Config(format!(
                "policy {key_prefix:?}: max_requests must be greater than 0"
            )));
        }
        if window.as_millis() == 0 {
            return Err(QuotaguardError::Config(format!(
                "policy {key_prefix:?}: window must be at least 1ms"
            )));
        }

        Ok(Self {
            max_requests,
            window,
            key_prefix,
        })
    }

    /// Create a policy with the window given in milliseconds.
    pub fn from_millis(max_requests: u64, window_ms: u64, key_prefix: impl Into<String>) -> Result<Self> {
        Self::new(max_requests, Duration::from_millis(window_ms), key_prefix)
    }

    /// The built-in policy for a catalog entry.
    ///
    /// The built-in quotas are all non-zero, so no validation is needed.
    pub fn catalog_default(name: PolicyName) -> Self {
        let settings = PolicySettings::defaults(name);
        Self {
            max_requests: settings.max_requests,
            window: Duration::from_millis(settings.window_ms),
            key_prefix: name.as_str().to_string(),
        }
    }

    /// Maximum number of allowed actions per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Length of each window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Namespace prepended to caller keys.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Build the namespaced store key for a caller key.
    pub fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_creation() {
        let policy = Policy::from_millis(3, 1000, "test").unwrap();
        assert_eq!(policy.max_requests(), 3);
        assert_eq!(policy.window(), Duration::from_secs(1));
        assert_eq!(policy.key_prefix(), "test");
    }

    #[test]
    fn test_zero_max_requests_rejected() {
        let err = Policy::from_millis(0, 1000, "test").unwrap_err();
        assert!(matches!(err, QuotaguardError::Config(_)));
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(Policy::from_millis(5, 0, "test").is_err());
        assert!(Policy::new(5, Duration::from_micros(999), "test").is_err());
    }

    #[test]
    fn test_catalog_defaults_pass_validation() {
        for name in PolicyName::ALL {
            let settings = PolicySettings::defaults(name);
            let validated = Policy::from_millis(settings.max_requests, settings.window_ms, name.as_str()).unwrap();
            assert_eq!(Policy::catalog_default(name), validated);
        }
    }

    #[test]
    fn test_full_key() {
        let policy = Policy::from_millis(1, 1, "auth").unwrap();
        assert_eq!(policy.full_key("user:42"), "auth:user:42");
    }
}
