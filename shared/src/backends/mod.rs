//! Data-source backends.
//!
//! The [`Backend`] trait defines the interface every data source satisfies:
//! table listing for completion, statement execution and a display name.
//! Backends are selected and constructed by the [`Registry`].

pub mod dummy;
pub mod elastic;
pub mod filesystem;
pub mod registry;
pub mod sqlite;

pub use dummy::DummyBackend;
pub use elastic::ElasticBackend;
pub use filesystem::FilesystemBackend;
pub use registry::{infer_type_hint, BackendKind, LoadError, Registration, Registry};
pub use sqlite::SqliteBackend;

use crate::query::Statement;
use async_trait::async_trait;
use thiserror::Error;

/// A single result row: field name to value, in field order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Data returned by a successful query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Documents, directory entries or relational rows.
    Rows(Vec<Row>),
    /// Aggregation results keyed by aggregation name.
    Aggregations(Row),
    /// Number of matching documents.
    Count(u64),
    /// The statement itself, returned by the dummy backend.
    Echo(serde_json::Value),
}

/// Result of executing a statement.
///
/// The engine rejecting a query is not a failure of the session: the reason is
/// meant to be shown to the operator, and is kept apart from real data so a
/// caller can never render one as the other.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The query ran.
    Data(QueryOutput),
    /// The engine refused the query.
    Rejected {
        /// Root-cause reason reported by the engine.
        reason: String,
    },
}

impl Outcome {
    /// Wraps rows into a successful outcome.
    #[must_use]
    pub fn rows(rows: Vec<Row>) -> Self {
        Self::Data(QueryOutput::Rows(rows))
    }

    /// Returns the rows if this outcome holds rows.
    #[must_use]
    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            Self::Data(QueryOutput::Rows(rows)) => Some(rows),
            _ => None,
        }
    }
}

/// Errors that can occur while constructing a backend or running a query.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The data source could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The statement cannot be expressed in the backend's query language.
    #[error("Translation failed: {0}")]
    Translation(String),

    /// The aggregate function is recognized syntax but not supported.
    #[error("Unsupported aggregation function: '{0}'")]
    UnsupportedAggregation(String),

    /// Fields outside the backend's fixed field set were requested.
    #[error(
        "Unsupported field(s): {}. Supported fields: {}",
        .requested.join(", "),
        .supported.join(", ")
    )]
    UnsupportedField {
        /// The offending field names.
        requested: Vec<String>,
        /// The fields the backend can produce.
        supported: Vec<&'static str>,
    },

    /// The statement has no raw text to pass through.
    #[error("Statement carries no raw text to pass through")]
    MissingRawText,

    /// The remote engine answered with an unexpected status.
    #[error("Request failed with status {status}: {body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The remote engine answered with a body that does not have the expected shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Filesystem error.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid glob pattern.
    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to acquire the connection lock.
    #[error("Failed to acquire lock on connection")]
    LockError,
}

/// Trait for data-source backends.
///
/// One instance lives for a whole session and owns its client handle.
/// Queries are independent of each other.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable name for the status line.
    fn name(&self) -> String;

    /// Lists the tables (indices, files, relations) the backend can query.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source cannot be reached.
    async fn list_tables(&self) -> Result<Vec<String>, BackendError>;

    /// Executes a statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be translated or the data
    /// source fails. Engine-side validation errors are returned as
    /// [`Outcome::Rejected`] instead.
    async fn execute(&self, statement: &Statement) -> Result<Outcome, BackendError>;
}
