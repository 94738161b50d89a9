//! Client error types.

use std::fmt;

use outcall_core::TracingError;
use outcall_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that end the process.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration could not be found, read or parsed.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Logging could not be set up.
    Logging(TracingError),
    /// The server failed to start or stopped with an error.
    Server(ServerError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Logging(err) => write!(f, "logging error: {}", err),
            Self::Server(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Server(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<TracingError> for ClientError {
    fn from(err: TracingError) -> Self {
        Self::Logging(err)
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Config { message } => Self::Config(message),
            other => Self::Server(other),
        }
    }
}
