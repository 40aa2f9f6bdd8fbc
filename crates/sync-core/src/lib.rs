//! Core types for the maxwell-sync framework.
//!
//! This crate provides the foundational types used across the sync
//! framework:
//!
//! - [`ChangeEvent`] - One decoded row-level change or DDL notification
//! - [`OperationKind`] - The operation a change event carries
//! - [`ColumnValue`] - A single column value, classified once at decode time
//! - [`ColumnMap`] - Ordered column name → value mapping
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── mysql-types                (renders ChangeEvent as MySQL statements)
//!    └─── maxwell-sync-mysql-sink    (dispatches events, executes statements)
//! ```
//!
//! # Example
//!
//! ```rust
//! use sync_core::{ChangeEvent, ColumnValue, OperationKind};
//!
//! let payload = serde_json::json!({
//!     "database": "shop",
//!     "table": "orders",
//!     "type": "update",
//!     "data": {"id": 7, "status": "shipped"},
//!     "primary_key_columns": ["id"]
//! });
//!
//! let event = ChangeEvent::from_payload(&payload).unwrap();
//! assert_eq!(event.kind, OperationKind::Update);
//! assert_eq!(event.data.get("id"), Some(&ColumnValue::Integer(7)));
//! ```

pub mod change;
pub mod error;
pub mod values;

pub use change::{ChangeEvent, OperationKind};
pub use error::DecodeError;
pub use values::{ColumnMap, ColumnValue};
