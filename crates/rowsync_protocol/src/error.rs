//! Error types for protocol encoding and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding, or validating messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message body is not valid JSON for the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A patch key is not of the form `<collection>/<id>`.
    #[error("invalid patch key: {0:?}")]
    InvalidKey(String),

    /// A collection name is not recognised.
    #[error("unknown collection: {0:?}")]
    UnknownCollection(String),
}

impl ProtocolError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }
}
