//! Change events emitted by the replication log reader.
//!
//! A change event is one row-level insert/update/delete, or one DDL
//! statement, in Maxwell's JSON format:
//!
//! ```json
//! {
//!   "database": "shop",
//!   "table": "orders",
//!   "type": "update",
//!   "ts": 1700000000,
//!   "xid": 8249,
//!   "data": {"id": 7, "status": "shipped"},
//!   "primary_key_columns": ["id"]
//! }
//! ```
//!
//! DDL events carry the ready statement in `sql` instead of `data`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::DecodeError;
use crate::values::ColumnMap;

/// The operation a change event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    /// Insert produced by an initial snapshot load rather than a live change
    BootstrapInsert,
    Update,
    Delete,
    CreateTable,
    AlterTable,
    /// Any other operation type, kept verbatim for logging
    Unknown(String),
}

impl OperationKind {
    /// Map the payload's `type` field to an operation kind.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "insert" => Self::Insert,
            "bootstrap-insert" => Self::BootstrapInsert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "table-create" => Self::CreateTable,
            "table-alter" => Self::AlterTable,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The `type` value as it appears on the wire.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Insert => "insert",
            Self::BootstrapInsert => "bootstrap-insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::CreateTable => "table-create",
            Self::AlterTable => "table-alter",
            Self::Unknown(s) => s,
        }
    }

    /// Whether events of this kind carry a ready-made DDL statement.
    pub fn is_ddl(&self) -> bool {
        matches!(self, Self::CreateTable | Self::AlterTable)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One decoded change event. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Target database
    pub database: String,
    /// Target table (may be empty for DDL events)
    pub table: String,
    pub kind: OperationKind,
    /// Column values in payload order
    pub data: ColumnMap,
    /// Row identity columns, in key order
    pub primary_key_columns: Vec<String>,
    /// Ready-made statement for DDL events
    pub raw_statement: Option<String>,
    /// Commit timestamp from the binlog, when present
    pub timestamp: Option<DateTime<Utc>>,
    /// Transaction id from the binlog, when present
    pub xid: Option<u64>,
}

/// Wire shape of a change event payload.
#[derive(Debug, Deserialize)]
struct RawChangeEvent {
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    primary_key_columns: Option<Vec<String>>,
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    ts: Option<i64>,
    #[serde(default)]
    xid: Option<u64>,
}

impl ChangeEvent {
    /// Decode a change event from its JSON payload.
    pub fn from_payload(payload: &Value) -> Result<Self, DecodeError> {
        let raw = RawChangeEvent::deserialize(payload)?;

        let database = raw
            .database
            .filter(|d| !d.is_empty())
            .ok_or(DecodeError::MissingDatabase)?;
        let kind = raw
            .kind
            .filter(|k| !k.is_empty())
            .ok_or(DecodeError::MissingType)?;

        Ok(Self {
            database,
            table: raw.table.unwrap_or_default(),
            kind: OperationKind::from_wire(&kind),
            data: raw.data.map(ColumnMap::from_json_object).unwrap_or_default(),
            primary_key_columns: raw.primary_key_columns.unwrap_or_default(),
            raw_statement: raw.sql,
            timestamp: raw.ts.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            xid: raw.xid,
        })
    }

    /// Whether `name` is one of the event's primary key columns.
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key_columns.iter().any(|k| k == name)
    }
}
