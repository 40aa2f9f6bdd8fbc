//! Errors raised while building statements.
//!
//! Every variant is a contract violation in the incoming event: the event is
//! failed on its own and no SQL is produced for it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Primary key column list is empty")]
    EmptyPrimaryKey,

    #[error("Primary key column '{0}' has no value in the event data")]
    MissingKeyColumn(String),

    #[error("Event has no target table")]
    MissingTable,

    #[error("Insert into '{0}' has no columns")]
    NoColumns(String),

    #[error("Update of '{0}' has no non-key columns to set")]
    NothingToUpdate(String),

    #[error("DDL event '{0}' has no SQL statement")]
    MissingRawStatement(String),

    #[error("Failed to serialize document value: {0}")]
    Document(#[from] serde_json::Error),
}
