//! Upstream connector
//!
//! Maps a classified [`ProtocolKind`] to its configured (host, port) target
//! and dials it with bounded retries. Upstreams normally run on loopback next
//! to the proxy; `remote_host` redirects the whole set elsewhere.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::UpstreamError;
use crate::sniff::ProtocolKind;

/// Connect attempts before the task is failed
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Sleep between attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Per-attempt connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Select the upstream (host, port) for a protocol kind
///
/// Unknown traffic goes to the SSH upstream, the fallback every deployed
/// client expects.
#[must_use]
pub fn upstream_of(kind: ProtocolKind, config: &ProxyConfig) -> (String, u16) {
    let port = match kind {
        ProtocolKind::Ssh | ProtocolKind::Unknown => config.ssh_port,
        ProtocolKind::OpenVpn => config.openvpn_port,
        ProtocolKind::V2Ray => config.v2ray_port,
    };
    (config.remote_host.clone(), port)
}

/// Connect to the upstream for a protocol kind
///
/// Dials up to [`CONNECT_ATTEMPTS`] times with [`RETRY_DELAY`] between
/// attempts and [`CONNECT_TIMEOUT`] per attempt. The socket has `TCP_NODELAY`
/// set on success.
///
/// # Errors
///
/// Returns `UpstreamError::ConnectFailed` once every attempt has failed.
pub async fn connect_upstream(
    kind: ProtocolKind,
    config: &ProxyConfig,
) -> Result<TcpStream, UpstreamError> {
    let (host, port) = upstream_of(kind, config);
    let addr = format!("{host}:{port}");

    let mut last_error = String::new();

    for attempt in 1..=CONNECT_ATTEMPTS {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                debug!(
                    upstream = %addr,
                    protocol = %kind,
                    attempt,
                    "Connected to upstream"
                );
                return Ok(stream);
            }
            Ok(Err(e)) => {
                last_error = e.to_string();
                warn!(
                    upstream = %addr,
                    protocol = %kind,
                    attempt,
                    error = %last_error,
                    "Upstream connect attempt failed"
                );
            }
            Err(_) => {
                last_error = format!("timed out after {}s", CONNECT_TIMEOUT.as_secs());
                warn!(
                    upstream = %addr,
                    protocol = %kind,
                    attempt,
                    "Upstream connect attempt timed out"
                );
            }
        }

        if attempt < CONNECT_ATTEMPTS {
            sleep(RETRY_DELAY).await;
        }
    }

    Err(UpstreamError::connect_failed(
        addr,
        CONNECT_ATTEMPTS,
        last_error,
    ))
}
