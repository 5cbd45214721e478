//! sql-mojo Shared Library
//!
//! This crate contains the statement model, the SQL parser and the
//! data-source backends used by the sql-mojo shell.
//!
//! # Modules
//!
//! - [`query`] - Statement model and SQL parsing
//! - [`backends`] - Backend trait, registry and the built-in backends
//! - [`config`] - Runtime settings
//!
//! # Example
//!
//! ```
//! use shared::query::{parse_statement, Table};
//!
//! let statement = parse_statement("SELECT name, size FROM '/var/log'").unwrap();
//!
//! assert_eq!(statement.table, Table::Named("/var/log".to_string()));
//! assert!(statement.predicate.is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod backends;
pub mod config;
pub mod query;

/// Re-export common dependencies for convenience.
pub use serde_json;
