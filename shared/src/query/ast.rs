//! Abstract Syntax Tree definitions for statements.
//!
//! A [`Statement`] is the backend-agnostic form every backend consumes. It is
//! usually produced by [`parse_statement`](super::parse_statement), but can be
//! built directly with the builder methods.

use serde::{Deserialize, Serialize};

/// The collection or relation a statement targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// Wildcard `*`: every collection the backend knows.
    All,
    /// A single named collection, index, directory entry or glob.
    Named(String),
}

impl Table {
    /// Returns the table name, or `*` for the wildcard.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "*",
            Self::Named(name) => name,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::Named(name) => write!(f, "\"{}\"", escape(name, '"')),
        }
    }
}

/// A single entry of the SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    /// A plain field reference.
    Field(String),
    /// An aggregate function applied to one field, e.g. `avg(price)`.
    Function {
        /// Function name as written.
        name: String,
        /// The field argument, or `*`.
        argument: String,
    },
}

impl Column {
    /// Creates a plain field column.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    /// Creates a function-application column.
    #[must_use]
    pub fn function(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::Function {
            name: name.into(),
            argument: argument.into(),
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{name}"),
            Self::Function { name, argument } => write!(f, "{name}({argument})"),
        }
    }
}

/// The SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Columns {
    /// Wildcard `*`: all fields.
    All,
    /// An ordered, non-empty list of columns.
    List(Vec<Column>),
}

impl std::fmt::Display for Columns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::List(columns) => {
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{column}")?;
                }
                Ok(())
            }
        }
    }
}

/// A value in the query (string, number, or boolean).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// String value (e.g., 'open', "api-service")
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
}

impl Value {
    /// Converts the value into its JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::from(s.as_str()),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(fl) => serde_json::Value::from(*fl),
            Self::Boolean(b) => serde_json::Value::from(*b),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{}'", escape(s, '\'')),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// A filter expression.
///
/// Only equality, negated equality and conjunction exist. There is no
/// disjunction and no ordering comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// `field = value`
    Eq {
        /// The field name to compare.
        field: String,
        /// The value to compare against.
        value: Value,
    },
    /// `field != value`
    NotEq {
        /// The field name to compare.
        field: String,
        /// The value to compare against.
        value: Value,
    },
    /// All sub-predicates must hold.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Creates an equality predicate.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::Eq {
            field: field.into(),
            value,
        }
    }

    /// Creates a negated-equality predicate.
    #[must_use]
    pub fn not_eq(field: impl Into<String>, value: Value) -> Self {
        Self::NotEq {
            field: field.into(),
            value,
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq { field, value } => write!(f, "{field} = {value}"),
            Self::NotEq { field, value } => write!(f, "{field} != {value}"),
            Self::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    if matches!(child, Self::And(_)) {
                        write!(f, "({child})")?;
                    } else {
                        write!(f, "{child}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// A parsed SQL-like statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// The target collection.
    pub table: Table,
    /// The SELECT list.
    pub columns: Columns,
    /// Optional WHERE clause; `None` matches everything.
    pub predicate: Option<Predicate>,
    /// Optional LIMIT clause.
    pub limit: Option<usize>,
    /// The statement text as typed, when it came from the parser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Statement {
    /// Creates a `SELECT * FROM <table>` statement.
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self {
            table,
            columns: Columns::All,
            predicate: None,
            limit: None,
            raw: None,
        }
    }

    /// Sets the SELECT list.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = Columns::List(columns);
        self
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sets the LIMIT.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attaches the original statement text.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT {} FROM {}", self.columns, self.table)?;

        if let Some(ref predicate) = self.predicate {
            write!(f, " WHERE {predicate}")?;
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }

        Ok(())
    }
}

/// Backslash-escapes `quote` and backslashes so the text can be quoted again.
fn escape(text: &str, quote: char) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c == quote || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
