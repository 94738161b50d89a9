//! Termination signals.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) set a shared stop flag. Clones of
//! [`SignalHandler`] share the flag, so tests and other tasks can request a
//! shutdown without sending a real signal.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::error::ServerResult;

/// Owner of the stop flag.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    stop: Arc<watch::Sender<bool>>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop: Arc::new(stop),
        }
    }

    /// Installs the signal handlers, then waits for them on a task.
    ///
    /// Installation happens before returning so a failure is reported at
    /// startup.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> ServerResult<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let handler = self.clone();

        tokio::spawn(async move {
            let name = tokio::select! {
                _ = terminate.recv() => "SIGTERM",
                _ = interrupt.recv() => "SIGINT",
            };
            info!(signal = name, "Shutting down");
            handler.request_shutdown();
        });
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> ServerResult<()> {
        let handler = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = "Ctrl+C", "Shutting down");
                handler.request_shutdown();
            }
        });
        Ok(())
    }

    /// Sets the stop flag as if a signal had arrived.
    pub fn request_shutdown(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.stop.borrow()
    }

    /// A waiter for the stop flag.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.stop.subscribe(),
        }
    }
}

/// Completes once shutdown has been requested.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the stop flag.
    ///
    /// Never completes once every handler is gone: nobody is left to
    /// request a shutdown, and only the idle timer may stop the server.
    pub async fn wait(mut self) {
        let orphaned = self.rx.wait_for(|stop| *stop).await.is_err();
        if orphaned {
            std::future::pending::<()>().await;
        }
    }
}
