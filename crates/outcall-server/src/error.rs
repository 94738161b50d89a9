//! Server error types.

use std::io;
use std::time::Duration;

use outcall_core::ResolveError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Fatal errors of the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Could not bind the listening address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The activation environment is malformed.
    #[error("Socket activation error: {message}")]
    Activation { message: String },

    /// Socket activation must hand over exactly one listener.
    #[error("Unexpected number of socket activation ({found} != 1)")]
    ActivationSocketCount { found: usize },

    /// In-flight requests did not finish within the grace period.
    #[error("Cannot gracefully shut down the server within {grace:?}")]
    DrainTimeout { grace: Duration },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an activation error.
    pub fn activation(message: impl Into<String>) -> Self {
        Self::Activation {
            message: message.into(),
        }
    }
}

/// Reasons a call request failed.
///
/// The `Display` text is what the caller sees; it never includes paths or
/// configuration values. Internal causes are logged where they occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The form body could not be parsed.
    #[error("Bad request")]
    BadRequest,

    /// The token did not match the configured secret.
    #[error("Unauthorized")]
    Unauthorized,

    /// Channel, or both application and context, missing after defaults.
    #[error("Required options not set")]
    RequiredOptionsNotSet,

    /// The staging file could not be written.
    #[error("Unable to create call file")]
    CreateCallFile,

    /// The staged file could not be moved into the outgoing directory.
    #[error("Unable to move call file into outgoing directory")]
    MoveCallFile,
}

impl From<ResolveError> for CallError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::RequiredOptionsNotSet => Self::RequiredOptionsNotSet,
        }
    }
}
