//! Per-connection pipeline
//!
//! Everything that happens to one accepted socket: TLS termination, the HTTP
//! decoy exchange, protocol sniffing, the upstream dial, and the bridge. The
//! whole pipeline runs as a single worker-pool task; errors are handled here
//! and never propagate past the task boundary.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::bridge::{CopyResult, TunnelSession};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, TlsError};
use crate::handshake::{self, HandshakeOutcome};
use crate::sniff::{classify_with_mode, ProtocolKind, SNIFF_BUFFER_SIZE, SNIFF_TIMEOUT};
use crate::upstream::connect_upstream;

use super::connection::{ClientConnection, ConnState};
use super::stats::ServerStats;

/// How one connection's pipeline ended
#[derive(Debug)]
enum PipelineEnd {
    /// The decoy exchange finished and the client went away (or was told to)
    DecoyOnly,
    /// A bridge ran to completion
    Bridged(ProtocolKind, CopyResult),
}

/// Handle one accepted connection end to end
///
/// This is the body of the task submitted to the worker pool. It records the
/// outcome on `stats` and logs it; it never returns an error.
pub async fn handle_client(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ProxyConfig>,
    tls_acceptor: Option<TlsAcceptor>,
    stats: Arc<ServerStats>,
) {
    stats.record_accepted();

    match run_pipeline(stream, peer_addr, &config, tls_acceptor).await {
        Ok(PipelineEnd::Bridged(kind, copy)) => {
            info!(
                client = %peer_addr,
                protocol = %kind,
                up = copy.client_to_upstream,
                down = copy.upstream_to_client,
                "Connection closed"
            );
            stats.record_completed(copy.client_to_upstream, copy.upstream_to_client);
        }
        Ok(PipelineEnd::DecoyOnly) => {
            debug!(client = %peer_addr, "Connection ended after decoy exchange");
            stats.record_decoy_only();
        }
        Err(e) => {
            match e {
                ProxyError::Handshake(ref err) => {
                    debug!(client = %peer_addr, error = %err, "Handshake failed")
                }
                ProxyError::Tls(ref err) => {
                    warn!(client = %peer_addr, error = %err, "TLS termination failed")
                }
                ProxyError::Upstream(ref err) => {
                    warn!(client = %peer_addr, error = %err, "Upstream unavailable")
                }
                ref err => warn!(client = %peer_addr, error = %err, "Connection failed"),
            }
            stats.record_failed();
        }
    }
}

/// The pipeline proper: TLS -> decoy -> sniff -> connect -> bridge
async fn run_pipeline(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: &ProxyConfig,
    tls_acceptor: Option<TlsAcceptor>,
) -> Result<PipelineEnd, ProxyError> {
    let mut conn = match tls_acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;
            debug!(client = %peer_addr, "TLS handshake completed");
            ClientConnection::tls(tls_stream, peer_addr)
        }
        None => ClientConnection::plain(stream, peer_addr),
    };

    conn.set_state(ConnState::Handshaking);
    let outcome = handshake::exchange(conn.stream_mut(), config).await?;
    if outcome == HandshakeOutcome::Close {
        conn.set_state(ConnState::Closed);
        return Ok(PipelineEnd::DecoyOnly);
    }

    conn.set_state(ConnState::Sniffing);
    let Some(sniffed) = read_sniff_buffer(&mut conn).await? else {
        conn.set_state(ConnState::Closing);
        debug!(
            client = %peer_addr,
            tls = conn.is_tls(),
            lifetime_ms = conn.accepted_at().elapsed().as_millis() as u64,
            "Client left after decoy exchange"
        );
        conn.set_state(ConnState::Closed);
        return Ok(PipelineEnd::DecoyOnly);
    };

    let kind = classify_with_mode(&sniffed, config.ssh_only);
    debug!(
        client = %peer_addr,
        protocol = %kind,
        sniffed = sniffed.len(),
        "Classified connection"
    );

    let upstream = connect_upstream(kind, config).await?;

    conn.set_state(ConnState::Bridging);
    let session = TunnelSession::new(
        conn.into_stream(),
        upstream,
        Bytes::from(sniffed),
        config.buffer_size,
    );
    let copy = session.run().await;

    Ok(PipelineEnd::Bridged(kind, copy))
}

/// Read the sniff buffer after the decoy exchange
///
/// Returns `None` when the client closed instead of sending tunnel bytes
/// (a plain HTTP probe that only wanted the decoy). A timeout with no data
/// classifies as Unknown downstream, so it yields an empty buffer rather
/// than an error.
async fn read_sniff_buffer(
    conn: &mut ClientConnection,
) -> Result<Option<Vec<u8>>, ProxyError> {
    let mut buf = [0u8; SNIFF_BUFFER_SIZE];

    match timeout(SNIFF_TIMEOUT, conn.stream_mut().read(&mut buf)).await {
        Ok(Ok(0)) => Ok(None),
        Ok(Ok(n)) => Ok(Some(buf[..n].to_vec())),
        Ok(Err(e)) => Err(ProxyError::Io(e)),
        Err(_) => {
            debug!(client = %conn.peer_addr(), "Sniff read timed out, treating as unknown");
            Ok(Some(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection and echo a fixed banner, then mirror input
    async fn spawn_banner_upstream(banner: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0);
            stream.write_all(banner).await.unwrap();
        });

        port
    }

    #[tokio::test]
    async fn test_pipeline_plain_http_then_bridge() {
        let upstream_port = spawn_banner_upstream(b"SSH-2.0-Upstream\r\n").await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = Arc::new(ProxyConfig {
            ssh_port: upstream_port,
            ..Default::default()
        });
        let stats = Arc::new(ServerStats::new());

        let server = {
            let config = Arc::clone(&config);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                handle_client(stream, peer, config, None, stats).await;
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        // Decoy response arrives first
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"HTTP/1.1 200 OK\r\n\r\n");

        // Tunnel bytes bridge to the upstream, which answers with its banner
        client.write_all(b"SSH-2.0-Client\r\n").await.unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"SSH-2.0-Upstream\r\n");

        drop(client);
        server.await.unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.bytes_up, 16);
        assert_eq!(snap.bytes_down, 18);
    }

    #[tokio::test]
    async fn test_pipeline_malformed_request_gets_400() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = Arc::new(ProxyConfig::default());
        let stats = Arc::new(ServerStats::new());

        let server = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                handle_client(stream, peer, config, None, stats).await;
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"\x00\x00\x00\x00\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 400 Bad Request"));

        server.await.unwrap();
        assert_eq!(stats.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_pipeline_decoy_only_when_client_leaves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = Arc::new(ProxyConfig::default());
        let stats = Arc::new(ServerStats::new());

        let server = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                handle_client(stream, peer, config, None, stats).await;
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert!(n > 0);

        // Client hangs up instead of tunneling
        drop(client);
        server.await.unwrap();

        assert_eq!(stats.snapshot().decoy_only, 1);
    }
}
