//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding API payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize a response to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Failed to parse a response body.
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// A urlencoded form with a bad `%` escape, a `;` separator, or bytes
    /// that are not UTF-8.
    #[error("malformed form data")]
    MalformedForm,
}
