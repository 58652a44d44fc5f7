//! Listener setup
//!
//! Builds the listening socket with `socket2` so the options the proxy needs
//! (`SO_REUSEADDR`, OS-maximum backlog, non-blocking mode) are applied before
//! the socket is handed to tokio, and raises the file-descriptor soft limit
//! to the configured target.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::ListenerError;

/// Create and bind the listener for the given port
///
/// Binds to `0.0.0.0:port` with `SO_REUSEADDR` and the OS-maximum backlog
/// (`SOMAXCONN`).
///
/// # Errors
///
/// Returns `ListenerError` if socket creation, option setting, binding, or
/// listening fails. All of these are fatal at startup.
pub fn bind_listener(port: u16) -> Result<TcpListener, ListenerError> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ListenerError::SocketCreation(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ListenerError::socket_option("SO_REUSEADDR", e.to_string()))?;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket
        .bind(&addr.into())
        .map_err(|e| ListenerError::bind(port, e.to_string()))?;

    socket
        .listen(libc::SOMAXCONN)
        .map_err(|e| ListenerError::socket_option("listen", e.to_string()))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| ListenerError::socket_option("O_NONBLOCK", e.to_string()))?;

    let listener = TcpListener::from_std(socket.into())
        .map_err(|e| ListenerError::SocketCreation(e.to_string()))?;

    info!(port, backlog = libc::SOMAXCONN, "Listener ready");

    Ok(listener)
}

/// Raise the file-descriptor soft limit to `target`
///
/// A soft limit already at or above the target is left alone. The hard limit
/// is never lowered; when the target exceeds it, the soft limit is raised to
/// the hard limit instead.
///
/// # Errors
///
/// Returns `ListenerError::RlimitError` if the limits cannot be read or set.
/// This is fatal at startup.
pub fn raise_fd_limit(target: u64) -> Result<(), ListenerError> {
    // Safety: getrlimit/setrlimit with a valid, initialized rlimit struct
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    let ret = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if ret != 0 {
        return Err(ListenerError::RlimitError {
            target,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }

    if limit.rlim_cur >= target {
        debug!(
            current = limit.rlim_cur,
            target, "File-descriptor limit already sufficient"
        );
        return Ok(());
    }

    let new_soft = target.min(limit.rlim_max);
    let new_limit = libc::rlimit {
        rlim_cur: new_soft,
        rlim_max: limit.rlim_max,
    };

    let ret = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &new_limit) };
    if ret != 0 {
        return Err(ListenerError::RlimitError {
            target,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }

    info!(
        soft = new_soft,
        hard = limit.rlim_max,
        "Raised file-descriptor limit"
    );

    Ok(())
}
