//! Bidirectional bridge
//!
//! Once a connection has been classified and its upstream dialed, the two
//! sockets are paired into a [`TunnelSession`] and bytes are relayed in both
//! directions until either side closes. The session owns both sockets; when
//! the forwarder returns, both are gone.

mod copy;

pub use copy::{copy_half, CopyResult, POLL_INTERVAL};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A paired (client, upstream) connection with its full-duplex forwarder
///
/// The `active` flag transitions true exactly once (at construction, after
/// the upstream connect succeeded) and false exactly once (when the first
/// half exits). Exactly one forwarder pair operates on the session.
pub struct TunnelSession<C> {
    client: C,
    upstream: TcpStream,
    /// Sniffed bytes replayed as the first write toward the upstream
    initial: Bytes,
    buffer_size: usize,
    active: Arc<AtomicBool>,
}

impl<C> TunnelSession<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a session from a classified client stream and its upstream
    #[must_use]
    pub fn new(client: C, upstream: TcpStream, initial: Bytes, buffer_size: usize) -> Self {
        Self {
            client,
            upstream,
            initial,
            buffer_size,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the session is still forwarding
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Run the forwarder until either direction terminates
    ///
    /// Two cooperating halves relay bytes, each with its own buffer. When one
    /// half reaches EOF or a fatal I/O error it flips the `active` flag; the
    /// other half observes the flip on its next poll tick and exits. Both
    /// sockets are closed when this returns.
    pub async fn run(self) -> CopyResult {
        let active = self.active;
        let initial = self.initial;
        let buffer_size = self.buffer_size;

        let (client_read, client_write) = tokio::io::split(self.client);
        let (upstream_read, upstream_write) = tokio::io::split(self.upstream);

        let c2u = tokio::spawn(copy_half(
            client_read,
            upstream_write,
            buffer_size,
            Arc::clone(&active),
            "client->upstream",
            Some(initial),
        ));
        let u2c = tokio::spawn(copy_half(
            upstream_read,
            client_write,
            buffer_size,
            Arc::clone(&active),
            "upstream->client",
            None,
        ));

        // JoinError only surfaces on panic; count those directions as zero
        let client_to_upstream = c2u.await.unwrap_or(0);
        let upstream_to_client = u2c.await.unwrap_or(0);

        debug!(
            up = client_to_upstream,
            down = upstream_to_client,
            "Bridge closed"
        );

        CopyResult {
            client_to_upstream,
            upstream_to_client,
        }
    }
}
