//! Wire types for the outcall HTTP API.
//!
//! Callers submit form fields (URL query, urlencoded or multipart body) to a
//! single endpoint and always get back a JSON object:
//!
//! ```json
//! {"status": "ok", "error": ""}
//! {"status": "error", "error": "Unauthorized"}
//! ```
//!
//! # Example
//!
//! ```rust
//! use outcall_protocol::{ApiResponse, decode_response, encode_response};
//!
//! let bytes = encode_response(&ApiResponse::error("Unauthorized")).unwrap();
//! let decoded = decode_response(&bytes).unwrap();
//! assert!(!decoded.is_ok());
//! ```

mod error;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use outcall_core::field;
pub use types::{ApiResponse, ApiStatus, FormFields, decode_response, encode_response};

/// Content type of every API response.
pub const RESPONSE_CONTENT_TYPE: &str = "application/json";

/// Largest accepted request body (32 MiB), multipart included.
pub const MAX_FORM_SIZE: usize = 32 << 20;
