//! Command-line interface definition.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Make an outgoing call via an API call.
#[derive(Debug, Parser)]
#[command(name = "outcall-api")]
#[command(version, about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Load configuration from file
    #[arg(long, short, env = "OUTCALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind address for the HTTP server
    #[arg(long = "http-bind", short = 'b')]
    pub http_bind: Option<String>,

    /// Bind port for the HTTP server
    #[arg(long = "http-port", short = 'p')]
    pub http_port: Option<u16>,

    /// Enable debug logging
    #[arg(long, short)]
    pub debug: bool,

    /// Print version
    #[arg(long, short = 'v', action = ArgAction::Version)]
    pub version: Option<bool>,
}

impl Cli {
    /// Bind address override, ignoring an empty value.
    pub fn bind_override(&self) -> Option<&str> {
        self.http_bind.as_deref().filter(|bind| !bind.is_empty())
    }

    /// Port override, ignoring zero.
    pub fn port_override(&self) -> Option<u16> {
        self.http_port.filter(|port| *port != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags() {
        let cli =
            Cli::try_parse_from(["outcall-api", "-c", "/etc/x.json", "-b", "127.0.0.1", "-p", "8080", "-d"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/x.json")));
        assert_eq!(cli.bind_override(), Some("127.0.0.1"));
        assert_eq!(cli.port_override(), Some(8080));
        assert!(cli.debug);
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let cli = Cli::try_parse_from(["outcall-api", "--http-bind", "", "--http-port", "0"]).unwrap();
        assert_eq!(cli.bind_override(), None);
        assert_eq!(cli.port_override(), None);
    }

    #[test]
    fn version_flag_prints_version() {
        let err = Cli::try_parse_from(["outcall-api", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert!(err.to_string().starts_with("outcall-api "));
    }
}
