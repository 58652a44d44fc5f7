//! Client connection types
//!
//! A [`ClientConnection`] exclusively owns one accepted downstream socket and
//! its optional TLS session. It is moved into the worker task that services
//! it; no shared mutability exists across workers.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// Lifecycle state of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted, not yet handled
    Accepted,
    /// Running the HTTP decoy exchange (after TLS termination)
    Handshaking,
    /// Waiting for the first tunnel bytes
    Sniffing,
    /// Relaying between client and upstream
    Bridging,
    /// Tearing down
    Closing,
    /// Done; the socket is gone
    Closed,
}

/// Unified stream type for accepted connections
///
/// Lets the pipeline treat plain TCP and TLS-terminated connections
/// uniformly after the accept phase. The TLS session is freed together with
/// (and before) its underlying socket when the stream is dropped.
pub enum ClientStream {
    /// Plain TCP stream
    Tcp(TcpStream),
    /// TLS-terminated stream
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            ClientStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ClientStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            ClientStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            ClientStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            ClientStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for ClientStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientStream::Tcp(_) => write!(f, "ClientStream::Tcp"),
            ClientStream::Tls(_) => write!(f, "ClientStream::Tls"),
        }
    }
}

/// One accepted downstream connection
#[derive(Debug)]
pub struct ClientConnection {
    stream: ClientStream,
    peer_addr: SocketAddr,
    accepted_at: Instant,
    state: ConnState,
}

impl ClientConnection {
    /// Wrap a plain accepted TCP stream
    #[must_use]
    pub fn plain(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream: ClientStream::Tcp(stream),
            peer_addr,
            accepted_at: Instant::now(),
            state: ConnState::Accepted,
        }
    }

    /// Wrap a TLS-terminated stream
    #[must_use]
    pub fn tls(stream: TlsStream<TcpStream>, peer_addr: SocketAddr) -> Self {
        Self {
            stream: ClientStream::Tls(Box::new(stream)),
            peer_addr,
            accepted_at: Instant::now(),
            state: ConnState::Accepted,
        }
    }

    /// Peer address of the downstream client
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// When this connection was accepted
    #[must_use]
    pub const fn accepted_at(&self) -> Instant {
        self.accepted_at
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ConnState {
        self.state
    }

    /// Advance the lifecycle state
    pub fn set_state(&mut self, state: ConnState) {
        self.state = state;
    }

    /// Whether this connection went through TLS termination
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, ClientStream::Tls(_))
    }

    /// Borrow the inner stream for the handshake and sniff phases
    pub fn stream_mut(&mut self) -> &mut ClientStream {
        &mut self.stream
    }

    /// Unwrap into the inner stream for bridging
    #[must_use]
    pub fn into_stream(self) -> ClientStream {
        self.stream
    }
}
