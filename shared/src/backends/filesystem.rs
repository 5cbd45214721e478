//! Filesystem metadata backend.
//!
//! Directory entries are rows; their metadata are the fields. The table names
//! a file, a directory (its children are listed), a glob relative to the base
//! path, or `*` for the base directory itself.

use super::{Backend, BackendError, Outcome, Row};
use crate::query::{Column, Columns, Statement, Table};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fields the filesystem backend can produce, in wildcard order.
pub const SUPPORTED_FIELDS: [&str; 8] = [
    "name",
    "ctime",
    "mtime",
    "atime",
    "owner",
    "group",
    "permissions",
    "size",
];

/// Backend listing file metadata below a base directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    base: PathBuf,
}

impl FilesystemBackend {
    /// Creates a backend rooted at `url`.
    ///
    /// A leading `~` is expanded to the home directory and relative paths are
    /// resolved against the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn open(url: &str) -> Result<Self, BackendError> {
        let expanded = expand_home(url);
        let base = if expanded.is_absolute() {
            expanded
        } else {
            let cwd = std::env::current_dir().map_err(|source| BackendError::Io {
                path: url.to_string(),
                source,
            })?;
            cwd.join(expanded)
        };

        debug!(base = %base.display(), "Opened filesystem backend");
        Ok(Self { base })
    }

    /// Returns `true` if `url` looks like a local path that exists.
    #[must_use]
    pub fn detect(url: &str) -> bool {
        !url.contains(':') && expand_home(url).exists()
    }

    /// Returns the directory every table is resolved against.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    fn resolve_paths(&self, table: &Table) -> Result<Vec<PathBuf>, BackendError> {
        let index = match table {
            Table::All => "",
            Table::Named(name) => name.as_str(),
        };
        let path = self.base.join(index);

        if path.is_dir() {
            list_dir(&path)
        } else if index.contains('*') {
            // Only the table is a pattern; metacharacters in the base are literal.
            let base = glob::Pattern::escape(&self.base.to_string_lossy());
            let pattern = Path::new(&base).join(index);
            debug!(pattern = %pattern.display(), "Expanding glob");
            let mut paths = Vec::new();
            for entry in glob::glob(&pattern.to_string_lossy())? {
                paths.push(entry.map_err(|e| BackendError::Io {
                    path: e.path().display().to_string(),
                    source: e.into_error(),
                })?);
            }
            Ok(paths)
        } else {
            Ok(vec![path])
        }
    }
}

#[async_trait]
impl Backend for FilesystemBackend {
    fn name(&self) -> String {
        format!("file:///{}", self.base.display())
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        Ok(list_dir(&self.base)?
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| format!("\"{}\"", name.to_string_lossy()))
            .collect())
    }

    async fn execute(&self, statement: &Statement) -> Result<Outcome, BackendError> {
        if statement.predicate.is_some() || statement.limit.is_some() {
            warn!("Filesystem backend ignores WHERE and LIMIT");
        }

        let fields = resolve_fields(&statement.columns)?;
        let paths = self.resolve_paths(&statement.table)?;
        debug!(count = paths.len(), table = %statement.table, "Resolved paths");

        let rows = paths
            .iter()
            .map(|path| file_row(path, &fields))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Outcome::rows(rows))
    }
}

/// Renders a byte count with binary unit scaling, e.g. `2048` as `2.0K`.
///
/// Plain byte counts carry no suffix.
///
/// # Examples
///
/// ```
/// use shared::backends::filesystem::human_readable;
///
/// assert_eq!(human_readable(0), "0");
/// assert_eq!(human_readable(2048), "2.0K");
/// ```
#[must_use]
pub fn human_readable(size: u64) -> String {
    const UNITS: [&str; 5] = ["K", "M", "G", "T", "P"];

    if size < 1024 {
        return size.to_string();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut scaled = size as f64 / 1024.0;
    for unit in UNITS {
        if scaled < 1024.0 {
            return format!("{scaled:.1}{unit}");
        }
        scaled /= 1024.0;
    }
    format!("{scaled:.1}E")
}

fn expand_home(url: &str) -> PathBuf {
    if url == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = url.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(url)
}

fn resolve_fields(columns: &Columns) -> Result<Vec<&'static str>, BackendError> {
    let requested = match columns {
        Columns::All => return Ok(SUPPORTED_FIELDS.to_vec()),
        Columns::List(columns) => columns,
    };

    let mut fields = Vec::with_capacity(requested.len());
    let mut unknown = Vec::new();
    for column in requested {
        let known = match column {
            Column::Field(name) => SUPPORTED_FIELDS.iter().find(|f| **f == name.as_str()),
            Column::Function { .. } => None,
        };
        match known {
            Some(field) => fields.push(*field),
            None => unknown.push(column.to_string()),
        }
    }

    if unknown.is_empty() {
        Ok(fields)
    } else {
        Err(BackendError::UnsupportedField {
            requested: unknown,
            supported: SUPPORTED_FIELDS.to_vec(),
        })
    }
}

fn list_dir(path: &Path) -> Result<Vec<PathBuf>, BackendError> {
    let io_error = |source| BackendError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut children = std::fs::read_dir(path)
        .map_err(io_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error)?;
    children.sort();
    Ok(children)
}

fn file_row(path: &Path, fields: &[&'static str]) -> Result<Row, BackendError> {
    let metadata = std::fs::metadata(path).map_err(|source| BackendError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut row = Row::new();
    for field in fields {
        let value = match *field {
            "name" => serde_json::Value::from(file_name(path)),
            "ctime" => timestamp(changed_at(&metadata)),
            "mtime" => timestamp(metadata.modified().ok().map(DateTime::<Utc>::from)),
            "atime" => timestamp(metadata.accessed().ok().map(DateTime::<Utc>::from)),
            "owner" => owner(&metadata),
            "group" => group(&metadata),
            "permissions" => permissions(&metadata),
            "size" => serde_json::Value::from(human_readable(metadata.len())),
            _ => serde_json::Value::Null,
        };
        row.insert((*field).to_string(), value);
    }
    Ok(row)
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn timestamp(time: Option<DateTime<Utc>>) -> serde_json::Value {
    time.map_or(serde_json::Value::Null, |t| {
        serde_json::Value::from(t.to_rfc3339_opts(SecondsFormat::Secs, true))
    })
}

#[cfg(unix)]
fn changed_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;

    let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
    DateTime::from_timestamp(metadata.ctime(), nanos)
}

#[cfg(not(unix))]
fn changed_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.created().ok().map(DateTime::<Utc>::from)
}

#[cfg(unix)]
fn owner(metadata: &Metadata) -> serde_json::Value {
    use std::os::unix::fs::MetadataExt;

    let uid = metadata.uid();
    let name = uzers::get_user_by_uid(uid)
        .map_or_else(|| uid.to_string(), |u| u.name().to_string_lossy().into_owned());
    serde_json::Value::from(name)
}

#[cfg(unix)]
fn group(metadata: &Metadata) -> serde_json::Value {
    use std::os::unix::fs::MetadataExt;

    let gid = metadata.gid();
    let name = uzers::get_group_by_gid(gid)
        .map_or_else(|| gid.to_string(), |g| g.name().to_string_lossy().into_owned());
    serde_json::Value::from(name)
}

/// Last three octal digits of the mode, read as a decimal number (`644`).
#[cfg(unix)]
fn permissions(metadata: &Metadata) -> serde_json::Value {
    use std::os::unix::fs::MetadataExt;

    let digits = format!("{:o}", metadata.mode() & 0o777);
    digits
        .parse::<u32>()
        .map_or(serde_json::Value::Null, serde_json::Value::from)
}

#[cfg(not(unix))]
fn owner(_metadata: &Metadata) -> serde_json::Value {
    serde_json::Value::Null
}

#[cfg(not(unix))]
fn group(_metadata: &Metadata) -> serde_json::Value {
    serde_json::Value::Null
}

#[cfg(not(unix))]
fn permissions(_metadata: &Metadata) -> serde_json::Value {
    serde_json::Value::Null
}
