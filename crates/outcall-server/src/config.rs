//! Server configuration.
//!
//! [`ApiConfig`] mirrors the JSON configuration file. It is loaded once at
//! startup, validated, wrapped in an `Arc` and never mutated afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use outcall_core::CallDefaults;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 9747;

/// Default Asterisk spool root.
pub const DEFAULT_SPOOL_DIR: &str = "/var/spool/asterisk";

/// Subdirectory of the spool root polled by Asterisk.
pub const OUTGOING_DIR: &str = "outgoing";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind when not socket-activated (empty = all interfaces).
    pub http_bind: String,

    pub http_port: u16,

    /// Log every request line at debug level.
    pub http_debug: bool,

    /// Take the listener from the service manager and exit when idle.
    pub http_systemd_socket: bool,

    /// Spool root; call files are staged here and moved to `outgoing/`.
    pub asterisk_spool_dir: PathBuf,

    /// Shared secret every request must present as `token`.
    pub api_token: String,

    /// Idle window before a socket-activated server exits.
    pub idle_timeout_secs: u64,

    /// How long in-flight requests may take once draining starts.
    pub drain_grace_secs: u64,

    /// `default_*` call fields and the `prevent_api_application` policy.
    #[serde(flatten)]
    pub call: CallDefaults,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_bind: String::new(),
            http_port: DEFAULT_HTTP_PORT,
            http_debug: false,
            http_systemd_socket: false,
            asterisk_spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
            api_token: String::new(),
            idle_timeout_secs: 30 * 60,
            drain_grace_secs: 5,
            call: CallDefaults::default(),
        }
    }
}

impl ApiConfig {
    /// Creates a configuration for the given spool root and token.
    pub fn new(spool_dir: impl Into<PathBuf>, api_token: impl Into<String>) -> Self {
        Self {
            asterisk_spool_dir: spool_dir.into(),
            api_token: api_token.into(),
            ..Default::default()
        }
    }

    /// Builder: set call defaults.
    pub fn with_call_defaults(mut self, call: CallDefaults) -> Self {
        self.call = call;
        self
    }

    /// Builder: set bind address and port.
    pub fn with_bind(mut self, bind: impl Into<String>, port: u16) -> Self {
        self.http_bind = bind.into();
        self.http_port = port;
        self
    }

    /// Builder: set socket activation.
    pub fn with_systemd_socket(mut self, enabled: bool) -> Self {
        self.http_systemd_socket = enabled;
        self
    }

    /// Returns `bind:port`, suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        let host = if self.http_bind.is_empty() {
            "0.0.0.0"
        } else {
            self.http_bind.as_str()
        };
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.http_port)
        } else {
            format!("{}:{}", host, self.http_port)
        }
    }

    /// Directory where call files are written before publication.
    pub fn staging_dir(&self) -> &Path {
        &self.asterisk_spool_dir
    }

    /// Directory Asterisk polls for call files.
    pub fn outgoing_dir(&self) -> PathBuf {
        self.asterisk_spool_dir.join(OUTGOING_DIR)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }

    /// Rejects configurations the server cannot run safely with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.api_token.is_empty() {
            return Err(ServerError::config("api_token must be set"));
        }
        if self.asterisk_spool_dir.as_os_str().is_empty() {
            return Err(ServerError::config("asterisk_spool_dir must be set"));
        }
        if self.http_systemd_socket && self.idle_timeout_secs == 0 {
            return Err(ServerError::config(
                "idle_timeout_secs must be positive with socket activation",
            ));
        }
        Ok(())
    }
}
