//! Backend registry and dispatcher.
//!
//! The set of backends is closed and known at compile time ([`BackendKind`]).
//! A [`Registry`] lists them in priority order, each optionally paired with a
//! detect function that recognizes URLs the backend can serve.

use super::{
    Backend, BackendError, DummyBackend, ElasticBackend, FilesystemBackend, SqliteBackend,
};
use crate::config::Settings;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Predicate deciding whether a backend can serve a URL.
pub type DetectFn = fn(&str) -> bool;

/// Errors that can occur while selecting and constructing a backend.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No type hint matched and no detect function recognized the URL.
    #[error("Could not determine a backend for '{url}'")]
    Undeterminable {
        /// The URL that was offered.
        url: String,
    },

    /// The backend was selected but could not be constructed.
    #[error("Failed to start {backend} backend: {source}")]
    Connect {
        /// Name of the selected backend.
        backend: &'static str,
        /// Underlying error.
        #[source]
        source: BackendError,
    },
}

/// The backends this build knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// [`DummyBackend`]
    Dummy,
    /// [`FilesystemBackend`]
    Filesystem,
    /// [`ElasticBackend`]
    Elasticsearch,
    /// [`SqliteBackend`]
    Sqlite,
}

impl BackendKind {
    /// Returns the name used as type hint.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Filesystem => "fs",
            Self::Elasticsearch => "elastic",
            Self::Sqlite => "sqlite",
        }
    }

    /// Looks up a kind by type hint, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "dummy" => Some(Self::Dummy),
            "fs" | "filesystem" => Some(Self::Filesystem),
            "elastic" | "elasticsearch" => Some(Self::Elasticsearch),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Constructs the backend for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source cannot be opened or reached.
    pub async fn connect(
        self,
        url: &str,
        settings: &Settings,
    ) -> Result<Box<dyn Backend>, BackendError> {
        let backend: Box<dyn Backend> = match self {
            Self::Dummy => Box::new(DummyBackend::new(url)),
            Self::Filesystem => Box::new(FilesystemBackend::open(url)?),
            Self::Elasticsearch => Box::new(ElasticBackend::connect(url, settings).await?),
            Self::Sqlite => Box::new(SqliteBackend::open(url)?),
        };
        Ok(backend)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A backend together with its optional detect function.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    /// The backend.
    pub kind: BackendKind,
    /// URL recognizer; `None` means the backend is only chosen by type hint.
    pub detect: Option<DetectFn>,
}

/// Ordered table of registered backends.
///
/// Earlier registrations take priority when several detect functions accept
/// the same URL.
///
/// # Example
///
/// ```
/// use shared::backends::{BackendKind, Registry};
///
/// let registry = Registry::builtin();
/// assert_eq!(registry.names(), vec!["sqlite", "fs", "elastic", "dummy"]);
/// assert_eq!(registry.select(Some("dummy"), "x").unwrap(), BackendKind::Dummy);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    registrations: Vec<Registration>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the registry of every backend in this build.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .register_detecting(BackendKind::Sqlite, SqliteBackend::detect)
            .register_detecting(BackendKind::Filesystem, FilesystemBackend::detect)
            .register(BackendKind::Elasticsearch)
            .register(BackendKind::Dummy)
    }

    /// Registers a backend that is only selectable by type hint.
    #[must_use]
    pub fn register(mut self, kind: BackendKind) -> Self {
        self.registrations.push(Registration { kind, detect: None });
        self
    }

    /// Registers a backend with a URL detect function.
    #[must_use]
    pub fn register_detecting(mut self, kind: BackendKind, detect: DetectFn) -> Self {
        self.registrations.push(Registration {
            kind,
            detect: Some(detect),
        });
        self
    }

    /// Returns the registered backend names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.registrations.iter().map(|r| r.kind.name()).collect()
    }

    /// Picks the backend for a type hint and URL without constructing it.
    ///
    /// A hint naming a registered backend wins. Otherwise the first
    /// registration whose detect function accepts `url` is chosen.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Undeterminable`] if nothing matches.
    pub fn select(&self, type_hint: Option<&str>, url: &str) -> Result<BackendKind, LoadError> {
        if let Some(hint) = type_hint {
            let by_name = BackendKind::from_name(hint)
                .filter(|kind| self.registrations.iter().any(|r| r.kind == *kind));
            match by_name {
                Some(kind) => return Ok(kind),
                None => warn!(hint, "Unknown backend type, falling back to detection"),
            }
        }

        self.registrations
            .iter()
            .find(|r| r.detect.is_some_and(|detect| detect(url)))
            .map(|r| r.kind)
            .ok_or_else(|| LoadError::Undeterminable {
                url: url.to_string(),
            })
    }

    /// Selects and constructs the backend for a type hint and URL.
    ///
    /// Construction errors are passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend matches or the chosen one fails to start.
    pub async fn load(
        &self,
        type_hint: Option<&str>,
        url: &str,
        settings: &Settings,
    ) -> Result<Box<dyn Backend>, LoadError> {
        let kind = self.select(type_hint, url)?;
        debug!(backend = %kind, url, "Selected backend");

        let backend = kind
            .connect(url, settings)
            .await
            .map_err(|source| LoadError::Connect {
                backend: kind.name(),
                source,
            })?;

        info!(backend = %backend.name(), "Backend ready");
        Ok(backend)
    }
}

/// Infers a type hint from the URL shape.
///
/// The search engine cannot be recognized by a cheap local check, so a URL
/// on its conventional port `9200` is taken as a hint for it.
#[must_use]
pub fn infer_type_hint(url: &str) -> Option<&'static str> {
    url.contains(":9200").then_some(BackendKind::Elasticsearch.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builtin_names_in_order() {
        assert_eq!(
            Registry::builtin().names(),
            vec!["sqlite", "fs", "elastic", "dummy"]
        );
    }

    #[test]
    fn test_select_by_hint() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.select(Some("fs"), "/does/not/matter").unwrap(),
            BackendKind::Filesystem
        );
        assert_eq!(
            registry.select(Some("ELASTIC"), "localhost").unwrap(),
            BackendKind::Elasticsearch
        );
        assert_eq!(
            registry.select(Some("elasticsearch"), "localhost").unwrap(),
            BackendKind::Elasticsearch
        );
    }

    #[test]
    fn test_hint_for_unregistered_backend_falls_back_to_detection() {
        let registry = Registry::new().register_detecting(BackendKind::Dummy, |_| true);
        assert_eq!(
            registry.select(Some("sqlite"), "x.db").unwrap(),
            BackendKind::Dummy
        );
    }

    #[test]
    fn test_unknown_hint_falls_back_to_detection() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.select(Some("mongo"), "data.db").unwrap(),
            BackendKind::Sqlite
        );
    }

    #[test]
    fn test_first_registered_detector_wins() {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().to_str().unwrap();

        let registry = Registry::new()
            .register_detecting(BackendKind::Dummy, |_| true)
            .register_detecting(BackendKind::Filesystem, FilesystemBackend::detect);
        assert_eq!(registry.select(None, url).unwrap(), BackendKind::Dummy);

        let registry = Registry::new()
            .register_detecting(BackendKind::Filesystem, FilesystemBackend::detect)
            .register_detecting(BackendKind::Dummy, |_| true);
        assert_eq!(registry.select(None, url).unwrap(), BackendKind::Filesystem);
    }

    #[test]
    fn test_database_file_prefers_sqlite_over_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        std::fs::write(&path, b"").unwrap();
        let url = path.to_str().unwrap();

        assert!(FilesystemBackend::detect(url));
        assert_eq!(
            Registry::builtin().select(None, url).unwrap(),
            BackendKind::Sqlite
        );
    }

    #[test]
    fn test_undeterminable() {
        let registry = Registry::builtin();
        let result = registry.select(None, "http://search.internal:9200");
        assert!(matches!(result, Err(LoadError::Undeterminable { .. })));

        let result = Registry::new().select(None, "anything");
        assert!(matches!(result, Err(LoadError::Undeterminable { .. })));
    }

    #[test]
    fn test_infer_type_hint() {
        assert_eq!(infer_type_hint("http://localhost:9200"), Some("elastic"));
        assert_eq!(infer_type_hint("localhost:9200/"), Some("elastic"));
        assert_eq!(infer_type_hint("/var/log"), None);
        assert_eq!(infer_type_hint("data.db"), None);
    }

    #[tokio::test]
    async fn test_load_dummy() {
        let backend = Registry::builtin()
            .load(Some("dummy"), "whatever", &Settings::default())
            .await
            .unwrap();
        assert_eq!(backend.name(), "Dummy");
    }

    #[tokio::test]
    async fn test_load_propagates_connection_failure() {
        let settings = Settings::default().with_request_timeout(Duration::from_secs(2));
        let result = Registry::builtin()
            .load(Some("elastic"), "http://127.0.0.1:1", &settings)
            .await;

        match result {
            Err(LoadError::Connect { backend, source }) => {
                assert_eq!(backend, "elastic");
                assert!(matches!(source, BackendError::Connection(_)));
            }
            Err(other) => panic!("expected Connect error, got {other:?}"),
            Ok(_) => panic!("expected Connect error, got a backend"),
        }
    }
}
