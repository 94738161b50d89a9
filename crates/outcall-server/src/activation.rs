//! Socket activation.
//!
//! Under a service manager the listening socket is opened before the process
//! starts and handed over as an inherited descriptor. `LISTEN_PID` names the
//! process the descriptors are meant for and `LISTEN_FDS` how many there are,
//! starting at descriptor 3.

use std::net::TcpListener;

use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

/// First inherited descriptor.
pub const LISTEN_FDS_START: i32 = 3;

const LISTEN_PID_VAR: &str = "LISTEN_PID";
const LISTEN_FDS_VAR: &str = "LISTEN_FDS";

/// Number of descriptors passed to the process with pid `our_pid`.
///
/// Descriptors addressed to another process (or no activation variables at
/// all) count as zero.
pub fn parse_listen_env(
    listen_pid: Option<&str>,
    listen_fds: Option<&str>,
    our_pid: u32,
) -> ServerResult<usize> {
    let Some(listen_pid) = listen_pid else {
        return Ok(0);
    };
    let pid: u32 = listen_pid
        .trim()
        .parse()
        .map_err(|_| ServerError::activation(format!("invalid {LISTEN_PID_VAR}: {listen_pid}")))?;
    if pid != our_pid {
        debug!(pid, our_pid, "Activation descriptors belong to another process");
        return Ok(0);
    }

    match listen_fds {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ServerError::activation(format!("invalid {LISTEN_FDS_VAR}: {raw}"))),
    }
}

/// Takes ownership of every listener the service manager passed in.
#[cfg(unix)]
pub fn listen_fds() -> ServerResult<Vec<TcpListener>> {
    let pid = std::env::var(LISTEN_PID_VAR).ok();
    let fds = std::env::var(LISTEN_FDS_VAR).ok();
    let count = parse_listen_env(pid.as_deref(), fds.as_deref(), std::process::id())?;
    debug!(count, "Inherited activation descriptors");

    // SAFETY: the service manager addressed these descriptors to this pid and
    // nothing else in the process has claimed them.
    unsafe { adopt_fds(LISTEN_FDS_START, count) }
}

#[cfg(not(unix))]
pub fn listen_fds() -> ServerResult<Vec<TcpListener>> {
    Err(ServerError::activation(
        "socket activation is only supported on Unix",
    ))
}

/// Wraps `count` descriptors starting at `start` as listeners.
///
/// # Safety
///
/// The descriptors must be open listening sockets that nothing else owns.
#[cfg(unix)]
unsafe fn adopt_fds(start: i32, count: usize) -> ServerResult<Vec<TcpListener>> {
    use std::os::fd::FromRawFd;

    let mut listeners = Vec::with_capacity(count);
    for offset in 0..count {
        let fd = start + offset as i32;
        // Take ownership first so the descriptor is closed on error.
        let listener = unsafe { TcpListener::from_raw_fd(fd) };
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(ServerError::activation(format!(
                "cannot mark descriptor {fd} close-on-exec: {}",
                std::io::Error::last_os_error()
            )));
        }
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Returns the only listener, or a fatal error for any other count.
pub fn select_single<T>(mut listeners: Vec<T>) -> ServerResult<T> {
    match listeners.len() {
        1 => listeners
            .pop()
            .ok_or(ServerError::ActivationSocketCount { found: 0 }),
        found => Err(ServerError::ActivationSocketCount { found }),
    }
}

/// The single socket-activated listener.
pub fn activated_listener() -> ServerResult<TcpListener> {
    let listener = select_single(listen_fds()?)?;
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Using socket-activated listener");
    }
    Ok(listener)
}
