//! Configuration management for Quotaguard.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{QuotaguardError, Result};
use crate::ratelimit::PolicyName;

/// Environment variable prefix for configuration overrides,
/// e.g. `QUOTAGUARD__SWEEPER__INTERVAL_SECS=30`.
pub const ENV_PREFIX: &str = "QUOTAGUARD";

/// Main configuration for Quotaguard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaguardConfig {
    /// Quotas for the policy catalog
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Background cleanup configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Quota and window for a single policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Actions allowed per window
    pub max_requests: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl PolicySettings {
    /// Create settings from a quota and a window in milliseconds.
    pub const fn new(max_requests: u64, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// The built-in quota for a catalog entry.
    pub const fn defaults(name: PolicyName) -> Self {
        match name {
            PolicyName::Api => Self::new(100, 60_000),
            PolicyName::Auth => Self::new(5, 900_000),
            PolicyName::Form => Self::new(10, 300_000),
            PolicyName::Email => Self::new(3, 3_600_000),
            PolicyName::Upload => Self::new(20, 3_600_000),
        }
    }
}

/// Configured changes to one policy. Unset fields keep the built-in value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
}

impl PolicyOverride {
    /// Apply the override on top of `base`.
    pub fn merge(&self, base: PolicySettings) -> PolicySettings {
        PolicySettings {
            max_requests: self.max_requests.unwrap_or(base.max_requests),
            window_ms: self.window_ms.unwrap_or(base.window_ms),
        }
    }
}

/// Quota overrides for every catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub api: PolicyOverride,

    #[serde(default)]
    pub auth: PolicyOverride,

    #[serde(default)]
    pub form: PolicyOverride,

    #[serde(default)]
    pub email: PolicyOverride,

    #[serde(default)]
    pub upload: PolicyOverride,
}

impl CatalogConfig {
    /// Get the effective settings for a catalog entry.
    pub fn settings(&self, name: PolicyName) -> PolicySettings {
        let overrides = match name {
            PolicyName::Api => &self.api,
            PolicyName::Auth => &self.auth,
            PolicyName::Form => &self.form,
            PolicyName::Email => &self.email,
            PolicyName::Upload => &self.upload,
        };
        overrides.merge(PolicySettings::defaults(name))
    }
}

/// Cleanup sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Whether long-running commands start the sweeper
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl SweeperConfig {
    /// Get the sweep interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl QuotaguardConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QuotaguardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| QuotaguardError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional YAML file, layered under
    /// `QUOTAGUARD__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        let config: QuotaguardConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QuotaguardError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        for name in PolicyName::ALL {
            let settings = self.catalog.settings(name);
            if settings.max_requests == 0 || settings.window_ms == 0 {
                return Err(QuotaguardError::Config(format!(
                    "policy {name}: max_requests and window_ms must be greater than 0"
                )));
            }
        }

        if self.sweeper.interval_secs == 0 {
            return Err(QuotaguardError::Config(
                "sweeper.interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
