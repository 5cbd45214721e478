//! SQLite file backend.
//!
//! Statements are not translated: the raw text is handed to the embedded
//! engine as typed. Only text the statement parser accepts gets here, so
//! this is the `SELECT ... FROM ... [WHERE] [LIMIT]` subset, evaluated with
//! SQLite semantics.

use super::{Backend, BackendError, Outcome, Row};
use crate::query::Statement;
use async_trait::async_trait;
use base64::Engine as _;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::sync::Mutex;
use tracing::debug;

/// Backend running statements against a SQLite database file.
pub struct SqliteBackend {
    path: String,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens an existing database file.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Connection`] if the file cannot be opened.
    pub fn open(path: &str) -> Result<Self, BackendError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| BackendError::Connection(format!("{path}: {e}")))?;

        debug!(path, "Opened SQLite database");
        Ok(Self {
            path: path.to_string(),
            conn: Mutex::new(conn),
        })
    }

    /// Returns `true` if `url` names a SQLite database file.
    #[must_use]
    pub fn detect(url: &str) -> bool {
        url.ends_with(".db")
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> String {
        format!("sqlite:{}", self.path)
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        let conn = self.conn.lock().map_err(|_| BackendError::LockError)?;
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    async fn execute(&self, statement: &Statement) -> Result<Outcome, BackendError> {
        let raw = statement
            .raw
            .as_deref()
            .ok_or(BackendError::MissingRawText)?;
        debug!(sql = raw, "Passing statement to SQLite");

        let conn = self.conn.lock().map_err(|_| BackendError::LockError)?;
        let mut stmt = match conn.prepare(raw) {
            Ok(stmt) => stmt,
            Err(e @ rusqlite::Error::SqliteFailure(..)) => {
                return Ok(Outcome::Rejected {
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                mapped.insert(column.clone(), to_json(row.get_ref(idx)?));
            }
            result.push(mapped);
        }

        Ok(Outcome::rows(result))
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(value) => serde_json::Value::from(value),
        ValueRef::Real(value) => serde_json::Value::from(value),
        ValueRef::Text(value) => serde_json::Value::from(String::from_utf8_lossy(value)),
        ValueRef::Blob(value) => {
            serde_json::Value::from(base64::engine::general_purpose::STANDARD.encode(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_statement, Table};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (
                 id INTEGER PRIMARY KEY, status TEXT, total REAL, note TEXT, tag BLOB
             );
             CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO orders VALUES (1, 'open', 9.5, NULL, x'0102');
             INSERT INTO orders VALUES (2, 'closed', 20.0, 'gift', NULL);
             INSERT INTO orders VALUES (3, 'open', 1.25, NULL, NULL);",
        )
        .unwrap();
        let url = path.to_str().unwrap().to_string();
        (dir, url)
    }

    #[test]
    fn test_detect() {
        assert!(SqliteBackend::detect("shop.db"));
        assert!(SqliteBackend::detect("/data/shop.db"));
        assert!(!SqliteBackend::detect("/data/shop.sqlite"));
        assert!(!SqliteBackend::detect("http://localhost:9200"));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");

        let result = SqliteBackend::open(path.to_str().unwrap());

        assert!(matches!(result, Err(BackendError::Connection(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (_dir, url) = fixture();
        let backend = SqliteBackend::open(&url).unwrap();

        assert_eq!(
            backend.list_tables().await.unwrap(),
            vec!["customers", "orders"]
        );
        assert_eq!(backend.name(), format!("sqlite:{url}"));
    }

    #[tokio::test]
    async fn test_execute_passes_raw_text_through() {
        let (_dir, url) = fixture();
        let backend = SqliteBackend::open(&url).unwrap();
        let statement =
            parse_statement("SELECT id, status FROM orders WHERE status = 'open'").unwrap();

        let outcome = backend.execute(&statement).await.unwrap();
        let rows = outcome.as_rows().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[0]["status"], "open");
        assert_eq!(rows[1]["id"], 3);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "status"]);
    }

    #[tokio::test]
    async fn test_execute_ignores_structured_fields() {
        let (_dir, url) = fixture();
        let backend = SqliteBackend::open(&url).unwrap();
        let statement = Statement::new(Table::Named("customers".to_string()))
            .with_limit(1)
            .with_raw("SELECT * FROM orders ORDER BY id");

        let outcome = backend.execute(&statement).await.unwrap();
        let rows = outcome.as_rows().unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["total"], 9.5);
        assert_eq!(rows[0]["note"], serde_json::Value::Null);
        assert_eq!(rows[0]["tag"], "AQI=");
        assert_eq!(rows[1]["note"], "gift");
    }

    #[tokio::test]
    async fn test_only_parsed_subset_reaches_the_engine() {
        let (_dir, url) = fixture();
        let backend = SqliteBackend::open(&url).unwrap();

        assert!(parse_statement("SELECT id FROM orders ORDER BY total").is_err());
        assert!(parse_statement("DELETE FROM orders").is_err());

        let statement = parse_statement("SELECT id FROM orders WHERE status != 'open'").unwrap();
        let outcome = backend.execute(&statement).await.unwrap();
        let rows = outcome.as_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_execute_without_raw_text_fails() {
        let (_dir, url) = fixture();
        let backend = SqliteBackend::open(&url).unwrap();
        let statement = Statement::new(Table::Named("orders".to_string()));

        let result = backend.execute(&statement).await;

        assert!(matches!(result, Err(BackendError::MissingRawText)));
    }

    #[tokio::test]
    async fn test_engine_error_is_rejected() {
        let (_dir, url) = fixture();
        let backend = SqliteBackend::open(&url).unwrap();
        let statement = parse_statement("SELECT * FROM invoices").unwrap();

        let outcome = backend.execute(&statement).await.unwrap();

        match outcome {
            Outcome::Rejected { reason } => assert!(reason.contains("no such table")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
