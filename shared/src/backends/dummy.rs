//! Identity backend that echoes statements back.

use super::{Backend, BackendError, Outcome, QueryOutput};
use crate::query::Statement;
use async_trait::async_trait;

/// Backend that lists a fixed set of tables and returns every statement as-is.
///
/// Useful to inspect what the parser produced and as a stand-in when no real
/// data source is at hand.
///
/// # Example
///
/// ```
/// use shared::backends::DummyBackend;
///
/// let backend = DummyBackend::new("anything");
/// assert_eq!(backend.url(), "anything");
/// ```
#[derive(Debug, Clone)]
pub struct DummyBackend {
    url: String,
}

impl DummyBackend {
    /// Creates a dummy backend for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Returns the URL the backend was created with.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Backend for DummyBackend {
    fn name(&self) -> String {
        "Dummy".to_string()
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        Ok(["foo", "bar", "bat"].map(String::from).to_vec())
    }

    async fn execute(&self, statement: &Statement) -> Result<Outcome, BackendError> {
        let echo = serde_json::to_value(statement)
            .map_err(|e| BackendError::Translation(e.to_string()))?;
        Ok(Outcome::Data(QueryOutput::Echo(echo)))
    }
}
