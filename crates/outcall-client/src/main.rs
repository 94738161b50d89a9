//! outcall-api entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use outcall_client::cli::Cli;
use outcall_client::config;
use outcall_client::error::ClientResult;
use outcall_client::serve;
use outcall_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let (config, path) = config::load(&cli)?;

    let debug = cli.debug || config.http_debug;
    let logging = if config.http_systemd_socket {
        TracingConfig::activated(debug)
    } else {
        TracingConfig::for_server(debug)
    };
    init_tracing(logging)?;
    info!(path = %path.display(), "Loaded configuration");

    serve::run(config).await
}
