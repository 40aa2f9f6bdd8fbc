//! Error types for change event decoding.

use thiserror::Error;

/// Errors raised when a payload does not have the shape of a change event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Payload is not a valid change event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is missing the database name")]
    MissingDatabase,

    #[error("Payload is missing the operation type")]
    MissingType,
}
