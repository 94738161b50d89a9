//! HTTP server: request pipeline, call-file publishing, lifecycle.
//!
//! This crate provides the outcall API server that:
//! - Accepts form-encoded call requests on a single HTTP endpoint
//! - Publishes call files atomically into the Asterisk spool
//! - Runs either persistently or socket-activated with an idle timeout
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use outcall_server::{
//!     ApiConfig, LifecycleConfig, ListenerSource, RequestPipeline, ServerLifecycle,
//!     SignalHandler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ApiConfig::new("/var/spool/asterisk", "secret"));
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     let lifecycle = ServerLifecycle::new(LifecycleConfig::from_api_config(&config));
//!     let app = Arc::new(RequestPipeline::new(config.clone())).router(lifecycle.activity());
//!     lifecycle
//!         .run(ListenerSource::Bind(config.bind_addr()), app, signals.shutdown())
//!         .await?;
//!     Ok(())
//! }
//! ```

mod activation;
mod config;
mod error;
mod lifecycle;
mod pipeline;
mod publisher;
mod signals;

pub use activation::{
    LISTEN_FDS_START, activated_listener, listen_fds, parse_listen_env, select_single,
};
pub use config::{ApiConfig, DEFAULT_HTTP_PORT, DEFAULT_SPOOL_DIR, OUTGOING_DIR};
pub use error::{CallError, ServerError, ServerResult};
pub use lifecycle::{
    ActivityMonitor, DrainCause, LifecycleConfig, LifecycleState, ListenerSource,
    ServerLifecycle, wait_for_drain,
};
pub use pipeline::{Clock, RequestPipeline, extract_fields};
pub use publisher::{CALL_FILE_PREFIX, CallFilePublisher};
pub use signals::{ShutdownSignal, SignalHandler};
