//! Configuration discovery and loading.
//!
//! The server reads one file at startup. Unless `--config` names an existing
//! file, the first of these is used:
//!
//! - `./config.json`
//! - `~/.config/asterisk-outgoing-call-api/config.json`
//! - `/etc/asterisk/outgoing-call-api.json`
//!
//! Files ending in `.toml` are parsed as TOML, everything else as JSON. Both
//! use the same keys.

use std::path::{Path, PathBuf};

use outcall_server::ApiConfig;
use tracing::debug;

use crate::cli::Cli;
use crate::error::{ClientError, ClientResult};

/// Directory name under the user configuration directory.
pub const APP_DIR: &str = "asterisk-outgoing-call-api";

/// System-wide configuration file.
pub const SYSTEM_CONFIG: &str = "/etc/asterisk/outgoing-call-api.json";

/// Paths tried in order, most specific first.
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(4);
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    paths.push(PathBuf::from("config.json"));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_DIR).join("config.json"));
    }
    paths.push(PathBuf::from(SYSTEM_CONFIG));
    paths
}

/// Returns the first candidate that exists.
pub fn discover(candidates: &[PathBuf]) -> ClientResult<PathBuf> {
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| ClientError::Config("Unable to find a configuration file.".into()))
}

/// Reads and parses one configuration file.
pub fn load_from(path: &Path) -> ClientResult<ApiConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let parsed = if is_toml {
        toml::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| ClientError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

/// Applies command-line bind and port overrides.
pub fn apply_overrides(config: &mut ApiConfig, cli: &Cli) {
    if let Some(bind) = cli.bind_override() {
        config.http_bind = bind.to_string();
    }
    if let Some(port) = cli.port_override() {
        config.http_port = port;
    }
}

/// Discovers, loads, overrides and validates the configuration.
///
/// Returns the configuration and the file it came from.
pub fn load(cli: &Cli) -> ClientResult<(ApiConfig, PathBuf)> {
    let path = discover(&candidate_paths(cli.config.as_deref()))?;
    debug!(path = %path.display(), "Using configuration file");

    let mut config = load_from(&path)?;
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok((config, path))
}
