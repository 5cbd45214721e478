//! Session settings shared by all backends.

use std::time::Duration;
use thiserror::Error;

/// Default timeout for a single backend request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An environment variable holds a value that cannot be parsed.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Settings applied when a backend is constructed.
///
/// Configuration values can be set via environment variables:
/// - `SQLMOJO_TIMEOUT_SECS`: request timeout for network backends (default: 180)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Upper bound for a single backend request.
    pub request_timeout: Duration,
}

impl Settings {
    /// Creates settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLMOJO_TIMEOUT_SECS` is set but is not a positive
    /// integer.
    pub fn from_env() -> Result<Self, SettingsError> {
        let request_timeout = match std::env::var("SQLMOJO_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(parse_timeout("SQLMOJO_TIMEOUT_SECS", &raw)?),
            Err(_) => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self { request_timeout })
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

fn parse_timeout(name: &'static str, raw: &str) -> Result<u64, SettingsError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(SettingsError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
