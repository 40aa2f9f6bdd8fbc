//! MySQL statement generation for sync-core change events.
//!
//! This crate turns a [`sync_core::ChangeEvent`] into the MySQL statement that
//! replays it. Everything here is pure: no connection, no I/O, and the same
//! event always renders to the same SQL.
//!
//! # Structure
//!
//! - `literal`: `ColumnValue` → SQL literal, string escaping, identifier quoting
//! - `json`: canonical document text for JSON column values
//! - `predicate`: primary-key `WHERE` predicate
//! - `statement`: INSERT / UPDATE / DELETE / DDL passthrough
//!
//! # Example
//!
//! ```rust
//! use mysql_types::build_statement;
//! use sync_core::ChangeEvent;
//!
//! let payload = serde_json::json!({
//!     "database": "shop",
//!     "table": "orders",
//!     "type": "delete",
//!     "data": {"id": 7, "region": "us"},
//!     "primary_key_columns": ["id", "region"]
//! });
//! let event = ChangeEvent::from_payload(&payload).unwrap();
//!
//! let statement = build_statement(&event).unwrap().unwrap();
//! assert_eq!(
//!     statement.as_sql(),
//!     "DELETE FROM orders WHERE id=7 AND region = 'us'"
//! );
//! ```

pub mod error;
pub mod json;
pub mod literal;
pub mod predicate;
pub mod statement;

pub use error::StatementError;
pub use json::document_to_text;
pub use literal::{escape_string, format_value, quote_identifier};
pub use predicate::build_key_predicate;
pub use statement::{build_statement, Statement};
