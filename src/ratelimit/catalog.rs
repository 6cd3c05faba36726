//! Named rate limit policies for the common action classes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::limiter::RateLimiter;
use super::policy::Policy;
use crate::clock::{Clock, SystemClock};
use crate::config::CatalogConfig;
use crate::error::{QuotaguardError, Result};

/// The action classes covered by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyName {
    /// High-frequency API calls
    Api,
    /// Login and other authentication attempts
    Auth,
    /// Form submissions
    Form,
    /// Outbound email triggers
    Email,
    /// File uploads
    Upload,
}

impl PolicyName {
    /// Every catalog entry, in table order.
    pub const ALL: [PolicyName; 5] = [
        PolicyName::Api,
        PolicyName::Auth,
        PolicyName::Form,
        PolicyName::Email,
        PolicyName::Upload,
    ];

    /// The name, which doubles as the policy's key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Api => "api",
            PolicyName::Auth => "auth",
            PolicyName::Form => "form",
            PolicyName::Email => "email",
            PolicyName::Upload => "upload",
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyName {
    type Err = QuotaguardError;

    fn from_str(s: &str) -> Result<Self> {
        PolicyName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QuotaguardError::Config(format!("unknown policy: {s:?}")))
    }
}

/// One independent limiter per action class.
///
/// Every limiter uses its catalog name as key prefix, so the same caller key
/// checked against two policies never shares state.
#[derive(Debug)]
pub struct PolicyCatalog {
    api: RateLimiter,
    auth: RateLimiter,
    form: RateLimiter,
    email: RateLimiter,
    upload: RateLimiter,
}

impl PolicyCatalog {
    /// Build the catalog with the default quotas.
    pub fn new() -> Self {
        Self::assemble(
            PolicyName::ALL.map(Policy::catalog_default),
            Arc::new(SystemClock::new()),
        )
    }

    /// Build the catalog from configured quotas.
    ///
    /// # Errors
    /// Returns `QuotaguardError::Config` if any quota or window is zero.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Build the catalog from configured quotas, reading time from `clock`.
    pub fn with_clock(config: &CatalogConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let [api, auth, form, email, upload] = PolicyName::ALL.map(|name| {
            let settings = config.settings(name);
            Policy::from_millis(settings.max_requests, settings.window_ms, name.as_str())
        });

        Ok(Self::assemble([api?, auth?, form?, email?, upload?], clock))
    }

    /// Wrap policies given in `PolicyName::ALL` order.
    fn assemble(policies: [Policy; 5], clock: Arc<dyn Clock>) -> Self {
        let [api, auth, form, email, upload] =
            policies.map(|policy| RateLimiter::with_clock(policy, Arc::clone(&clock)));

        info!(policies = PolicyName::ALL.len(), "Policy catalog initialized");
        Self {
            api,
            auth,
            form,
            email,
            upload,
        }
    }

    /// Get the limiter for an action class.
    pub fn get(&self, name: PolicyName) -> &RateLimiter {
        match name {
            PolicyName::Api => &self.api,
            PolicyName::Auth => &self.auth,
            PolicyName::Form => &self.form,
            PolicyName::Email => &self.email,
            PolicyName::Upload => &self.upload,
        }
    }

    /// Limiter for API calls.
    pub fn api(&self) -> &RateLimiter {
        &self.api
    }

    /// Limiter for authentication attempts.
    pub fn auth(&self) -> &RateLimiter {
        &self.auth
    }

    /// Limiter for form submissions.
    pub fn form(&self) -> &RateLimiter {
        &self.form
    }

    /// Limiter for outbound email.
    pub fn email(&self) -> &RateLimiter {
        &self.email
    }

    /// Limiter for file uploads.
    pub fn upload(&self) -> &RateLimiter {
        &self.upload
    }

    /// Iterate over all entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = (PolicyName, &RateLimiter)> {
        PolicyName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }

    /// Start a cleanup sweeper for every policy.
    pub fn start_cleanup(&self, interval: Duration) -> Result<()> {
        for (_, limiter) in self.iter() {
            limiter.start_cleanup(interval)?;
        }
        Ok(())
    }

    /// Stop every policy's cleanup sweeper.
    pub fn stop_cleanup(&self) {
        for (_, limiter) in self.iter() {
            limiter.stop_cleanup();
        }
    }

    /// Clear the state of every policy.
    pub fn reset_all(&self) {
        for (_, limiter) in self.iter() {
            limiter.reset_all();
        }
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::new()
    }
}
