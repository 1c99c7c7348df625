//! File-based API configuration.
//!
//! Mobile builds point at a backend on the developer's machine, whose address
//! changes often, so the address lives in a small TOML file rather than in
//! code:
//!
//! ```toml
//! host = "192.168.1.38"
//! backend_port = 8000
//!
//! [retry]
//! max_attempts = 3
//! retry_delay_ms = 1000
//! ```

use crate::retry::{RetryPolicy, DEFAULT_RETRYABLE_STATUS_CODES};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Where the backend lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// The backend's network address.
    pub host: String,

    /// The backend's port.
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Overrides the connectivity probe target.
    #[serde(default)]
    pub probe_url: Option<String>,

    /// Client-wide retry defaults.
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_backend_port() -> u16 {
    8000
}

fn default_scheme() -> String {
    "http".to_string()
}

/// Retry defaults as written in the config file, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
    pub retryable_status_codes: Vec<u16>,
    pub exponential_backoff: bool,
    pub timeout_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            exponential_backoff: true,
            timeout_ms: 30_000,
        }
    }
}

impl RetrySettings {
    /// Converts the settings into a [`RetryPolicy`]. `max_attempts` below 1
    /// is raised to 1.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
            .with_retryable_status_codes(self.retryable_status_codes.iter().copied())
            .with_exponential_backoff(self.exponential_backoff)
            .with_timeout(Duration::from_millis(self.timeout_ms))
    }
}

/// A problem found by [`ApiConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssue {
    /// The host is empty or the unspecified address.
    MissingHost,
    /// The host is a loopback name, which a physical device cannot reach.
    LoopbackHost,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::MissingHost => f.write_str("host is not set or invalid"),
            ConfigIssue::LoopbackHost => f.write_str(
                "host should be the machine's network address, not localhost (unreachable from physical devices)",
            ),
        }
    }
}

impl ApiConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConfigurationError`] if the document is invalid.
    pub fn from_toml_str(source: &str) -> crate::Result<Self> {
        toml::from_str(source)
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid API config: {}", e)))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ConfigurationError`] if the file cannot be read
    /// or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::ConfigurationError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// `scheme://host:port`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.backend_port)
    }

    /// Lists everything that will likely keep a device from reaching the backend.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let host = self.host.trim();

        if host.is_empty() || host == "0.0.0.0" {
            issues.push(ConfigIssue::MissingHost);
        }
        if host == "localhost" || host == "127.0.0.1" {
            issues.push(ConfigIssue::LoopbackHost);
        }

        issues
    }
}
