//! SQL-like statement model and parser.
//!
//! Every backend consumes the same [`Statement`]: a target table, a SELECT
//! list, an optional predicate tree and an optional limit.
//!
//! # Supported Syntax
//!
//! ```sql
//! SELECT * FROM orders WHERE status = 'open' AND priority != 3 LIMIT 5
//! SELECT name, size FROM *
//! SELECT count(*) FROM orders WHERE status = 'open'
//! ```
//!
//! # Example
//!
//! ```
//! use shared::query::{parse_statement, Predicate, Table, Value};
//!
//! let statement = parse_statement("SELECT * FROM orders WHERE status = 'open' LIMIT 5").unwrap();
//! assert_eq!(statement.table, Table::Named("orders".to_string()));
//! assert_eq!(statement.limit, Some(5));
//! assert_eq!(
//!     statement.predicate,
//!     Some(Predicate::eq("status", Value::String("open".to_string())))
//! );
//! ```

mod ast;
mod parser;

pub use ast::*;
pub use parser::{parse_statement, ParseError};
