//! Logging setup for the outcall API server.
//!
//! `RUST_LOG` always wins. Without it every `outcall*` target logs at INFO,
//! or at DEBUG when `http_debug` / `--debug` is set, which also turns on the
//! per-request `METHOD URI` lines.
//!
//! ```ignore
//! use outcall_core::tracing::{init_tracing, TracingConfig};
//!
//! let config = if socket_activated {
//!     TracingConfig::activated(debug)
//! } else {
//!     TracingConfig::for_server(debug)
//! };
//! init_tracing(config)?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// Target prefix shared by every crate of the workspace.
pub const LOG_TARGET_PREFIX: &str = "outcall";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

/// How the subscriber is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Show `file:line` of each event.
    pub source_locations: bool,
    pub timestamps: bool,
    pub ansi: bool,
    /// Explicit filter directive; replaces both `RUST_LOG` and `level`.
    pub directive: Option<String>,
}

impl TracingConfig {
    /// A server started by hand or by a plain service unit.
    #[must_use]
    pub fn for_server(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::INFO },
            format: TracingOutputFormat::Compact,
            source_locations: debug,
            timestamps: true,
            ansi: true,
            directive: None,
        }
    }

    /// A socket-activated server: the journal adds timestamps and does not
    /// render colours.
    #[must_use]
    pub fn activated(debug: bool) -> Self {
        Self {
            timestamps: false,
            ansi: false,
            ..Self::for_server(debug)
        }
    }

    #[must_use]
    pub fn json(mut self) -> Self {
        self.format = TracingOutputFormat::Json;
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// The directive used when neither `directive` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        format!("{}={}", LOG_TARGET_PREFIX, self.level)
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(directive) = &self.directive {
            return Ok(EnvFilter::try_new(directive)?);
        }
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_server(false)
    }
}

/// Installs the global subscriber. Call once, before serving.
///
/// # Errors
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        TracingOutputFormat::Json => fmt::layer()
            .json()
            .with_file(config.source_locations)
            .with_line_number(config.source_locations)
            .boxed(),
        TracingOutputFormat::Compact if config.timestamps => fmt::layer()
            .compact()
            .with_ansi(config.ansi)
            .with_file(config.source_locations)
            .with_line_number(config.source_locations)
            .boxed(),
        TracingOutputFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_ansi(config.ansi)
            .with_file(config.source_locations)
            .with_line_number(config.source_locations)
            .boxed(),
    };

    tracing::subscriber::set_global_default(Registry::default().with(output).with(filter))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_server_preset() {
        let config = TracingConfig::for_server(false);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, TracingOutputFormat::Compact);
        assert!(!config.source_locations);
        assert!(config.timestamps && config.ansi);
        assert_eq!(config, TracingConfig::default());
    }

    #[test]
    fn debug_shows_locations() {
        let config = TracingConfig::for_server(true);
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.source_locations);
        assert_eq!(config.default_directive(), "outcall=DEBUG");
    }

    #[test]
    fn activated_leaves_timestamps_to_the_journal() {
        let config = TracingConfig::activated(false);
        assert!(!config.timestamps);
        assert!(!config.ansi);
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn json_and_directive() {
        let config = TracingConfig::activated(true)
            .json()
            .with_directive("outcall_server=trace");
        assert_eq!(config.format, TracingOutputFormat::Json);
        assert!(config.filter().is_ok());
    }

    #[test]
    fn bad_directive_is_rejected() {
        let config = TracingConfig::default().with_directive("outcall=loudest");
        assert!(matches!(config.filter(), Err(TracingError::Filter(_))));
    }
}
