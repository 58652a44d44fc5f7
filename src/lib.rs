//! multiflow-proxy: transport-layer dispatch proxy for tunnel upstreams
//!
//! This crate implements a reverse proxy for operators who run SSH, OpenVPN,
//! and V2Ray daemons on loopback behind one publicly reachable port. Each
//! accepted connection gets a lightweight HTTP or WebSocket handshake (the
//! decoy that satisfies captive portals and CDN intermediaries), its first
//! tunnel bytes are classified by signature, and the stream is bridged to the
//! matching upstream until either side closes.
//!
//! # Architecture
//!
//! ```text
//! Client → TCP accept → [TLS terminate] → HTTP decoy / WebSocket upgrade
//!                                               ↓
//!                                        Protocol sniff
//!                                               ↓
//!                                   Upstream connect (SSH/OpenVPN/V2Ray)
//!                                               ↓
//!                                    Full-duplex bridge until EOF
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use multiflow_proxy::config::ProxyConfig;
//! use multiflow_proxy::server::ProxyServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProxyConfig::default();
//! config.validate()?;
//!
//! let server = ProxyServer::bind(config)?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration record and loading
//! - [`error`]: Error types
//! - [`handshake`]: HTTP decoy exchange and WebSocket upgrade
//! - [`sniff`]: Protocol signature classification
//! - [`upstream`]: Upstream target selection and dialing
//! - [`bridge`]: Full-duplex forwarder
//! - [`pool`]: Worker pool
//! - [`server`]: Listener, dispatch loop, per-connection pipeline
//! - [`tls`]: TLS termination

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod handshake;
pub mod pool;
pub mod server;
pub mod sniff;
pub mod tls;
pub mod upstream;

// Re-export commonly used types at the crate root
pub use bridge::{CopyResult, TunnelSession};
pub use config::{load_config, ProxyConfig};
pub use error::{
    ConfigError, HandshakeError, ListenerError, ProxyError, TlsError, UpstreamError,
};
pub use handshake::HandshakeOutcome;
pub use pool::WorkerPool;
pub use server::{ClientConnection, ClientStream, ConnState, ProxyServer, ServerStats};
pub use sniff::{classify, classify_with_mode, ProtocolKind};
pub use upstream::{connect_upstream, upstream_of};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
