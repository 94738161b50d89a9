//! Wires configuration, signals, the request pipeline and the lifecycle.

use std::sync::Arc;

use tracing::info;

use outcall_server::{
    ApiConfig, LifecycleConfig, ListenerSource, RequestPipeline, ServerLifecycle, SignalHandler,
    activated_listener,
};

use crate::error::ClientResult;

/// Runs the API server until it is told to stop or, when socket-activated,
/// until it has been idle long enough.
pub async fn run(config: ApiConfig) -> ClientResult<()> {
    let config = Arc::new(config);

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener()?;

    let source = if config.http_systemd_socket {
        ListenerSource::Activated(activated_listener()?)
    } else {
        ListenerSource::Bind(config.bind_addr())
    };

    let lifecycle = ServerLifecycle::new(LifecycleConfig::from_api_config(&config));
    let pipeline = Arc::new(RequestPipeline::new(Arc::clone(&config)));
    pipeline.publisher().check_dirs();
    info!(
        spool = %config.asterisk_spool_dir.display(),
        prevent_api_application = config.call.prevent_api_application,
        "Starting outcall API"
    );

    let app = pipeline.router(lifecycle.activity());
    lifecycle
        .run(source, app, signal_handler.shutdown())
        .await?;

    info!("outcall API stopped");
    Ok(())
}
