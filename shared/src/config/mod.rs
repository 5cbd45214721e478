//! Configuration module for sql-mojo.
//!
//! This module contains the settings applied when backends are constructed.

pub mod settings;

pub use settings::{Settings, SettingsError, DEFAULT_REQUEST_TIMEOUT_SECS};
