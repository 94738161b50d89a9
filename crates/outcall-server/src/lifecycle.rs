//! Server lifecycle.
//!
//! A persistent server binds its own address and runs until SIGINT/SIGTERM.
//! A socket-activated server serves the inherited listener until a signal
//! arrives or no request has been seen for the idle window, then drains:
//! it stops accepting, lets in-flight requests finish within the grace
//! period and exits. A drain that overruns the grace period is an error.
//!
//! ```text
//! Starting ──bind──────▶ ListeningPersistent
//!     └──activated──▶ ListeningActivated ──signal|idle──▶ Draining ──▶ Stopped
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinError;
use tracing::{debug, error, info};

use crate::config::ApiConfig;
use crate::error::{ServerError, ServerResult};
use crate::signals::ShutdownSignal;

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    ListeningPersistent,
    ListeningActivated,
    Draining,
    Stopped,
}

/// Why an activated server started draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainCause {
    Signal,
    Idle,
}

/// Request activity feed for the idle timer.
///
/// A touch made while nobody waits is kept and consumed by the next wait,
/// so a request racing the timer still resets it.
#[derive(Debug, Clone, Default)]
pub struct ActivityMonitor {
    notify: Arc<Notify>,
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request arrived.
    pub fn touch(&self) {
        self.notify.notify_one();
    }

    /// Completes on the next (or a pending) touch.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Timing of the activated mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub idle_timeout: Duration,
    pub drain_grace: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            drain_grace: Duration::from_secs(5),
        }
    }
}

impl LifecycleConfig {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            drain_grace: config.drain_grace(),
        }
    }
}

/// The listener the server runs on.
#[derive(Debug)]
pub enum ListenerSource {
    /// Bind this `host:port` and serve until a signal.
    Bind(String),
    /// Serve a listener handed over by the service manager.
    Activated(std::net::TcpListener),
}

/// Runs the HTTP server through its lifecycle states.
pub struct ServerLifecycle {
    config: LifecycleConfig,
    state: watch::Sender<LifecycleState>,
    activity: ActivityMonitor,
}

impl ServerLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            config,
            state,
            activity: ActivityMonitor::new(),
        }
    }

    /// Activity monitor to feed from the request path.
    pub fn activity(&self) -> ActivityMonitor {
        self.activity.clone()
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LifecycleState) {
        debug!(?state, "Lifecycle transition");
        self.state.send_replace(state);
    }

    /// Serves `app` until the lifecycle ends.
    pub async fn run(
        &self,
        source: ListenerSource,
        app: Router,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()> {
        match source {
            ListenerSource::Bind(addr) => self.run_persistent(addr, app, shutdown).await,
            ListenerSource::Activated(listener) => {
                self.run_activated(listener, app, shutdown).await
            }
        }
    }

    async fn run_persistent(
        &self,
        addr: String,
        app: Router,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()> {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = %listener.local_addr()?, "HTTP server listening");
        self.set_state(LifecycleState::ListeningPersistent);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }

    async fn run_activated(
        &self,
        listener: std::net::TcpListener,
        app: Router,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()> {
        listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(listener)?;
        info!(
            addr = %listener.local_addr()?,
            idle_timeout = ?self.config.idle_timeout,
            "HTTP server listening on activated socket"
        );

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        self.set_state(LifecycleState::ListeningActivated);

        let cause = tokio::select! {
            cause = wait_for_drain(self.config.idle_timeout, &self.activity, shutdown) => cause,
            result = &mut server => {
                self.set_state(LifecycleState::Stopped);
                return server_exit(result);
            }
        };

        match cause {
            DrainCause::Signal => info!("Shutdown requested, draining"),
            DrainCause::Idle => info!(
                idle_timeout = ?self.config.idle_timeout,
                "No request within idle window, draining"
            ),
        }
        self.set_state(LifecycleState::Draining);
        let _ = stop_tx.send(());

        let grace = self.config.drain_grace;
        match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => {
                self.set_state(LifecycleState::Stopped);
                server_exit(result)?;
                info!("HTTP server stopped");
                Ok(())
            }
            Err(_) => {
                server.abort();
                self.set_state(LifecycleState::Stopped);
                error!(?grace, "In-flight requests did not finish in time");
                Err(ServerError::DrainTimeout { grace })
            }
        }
    }
}

fn server_exit(result: Result<io::Result<()>, JoinError>) -> ServerResult<()> {
    match result {
        Ok(served) => Ok(served?),
        Err(e) => Err(ServerError::Io(io::Error::other(e.to_string()))),
    }
}

/// Waits until a shutdown signal or `idle` without activity, whichever
/// comes first. Every touch restarts the idle window.
pub async fn wait_for_drain(
    idle: Duration,
    activity: &ActivityMonitor,
    shutdown: ShutdownSignal,
) -> DrainCause {
    let shutdown = shutdown.wait();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => return DrainCause::Signal,
            _ = activity.notified() => debug!("Request seen, idle timer reset"),
            _ = tokio::time::sleep(idle) => return DrainCause::Idle,
        }
    }
}
