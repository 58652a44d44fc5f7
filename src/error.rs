//! Error types for multiflow-proxy
//!
//! This module defines the error hierarchy for the dispatch proxy. Errors are
//! categorized by subsystem and include recovery hints: startup errors
//! (config, listener, TLS setup) are fatal and map to exit code 1, while
//! per-connection errors are handled at task scope and never fail the
//! dispatch loop.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type for multiflow-proxy
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Configuration errors (flag parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listener socket errors
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    /// TLS setup and handshake errors
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// HTTP decoy handshake errors
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Upstream connection errors
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// Check if this error is recoverable (the dispatch loop may continue)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Listener(e) => e.is_recoverable(),
            Self::Tls(e) => e.is_recoverable(),
            Self::Handshake(_) | Self::Upstream(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Configuration-related errors
///
/// These are always fatal at startup: reported to stderr, exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid listener port
    #[error("Invalid listener port: {0} (must be 1..65535)")]
    InvalidPort(u32),

    /// Invalid worker count
    #[error("Invalid worker count: {0} (must be at least 1)")]
    InvalidWorkers(usize),

    /// Invalid buffer size
    #[error("Invalid buffer size: {0} bytes")]
    InvalidBufferSize(usize),

    /// Invalid upstream host
    #[error("Invalid upstream host: {0}")]
    InvalidHost(String),

    /// Invalid flag value
    #[error("Invalid value for {flag}: {value}")]
    InvalidFlag { flag: String, value: String },

    /// Config file not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are never recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }

    /// Create an invalid-flag error
    pub fn invalid_flag(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidFlag {
            flag: flag.into(),
            value: value.into(),
        }
    }
}

/// Listener socket errors
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to create the listener socket
    #[error("Failed to create listener socket: {0}")]
    SocketCreation(String),

    /// Failed to set a socket option
    #[error("Failed to set socket option {option}: {reason}")]
    SocketOption { option: String, reason: String },

    /// Failed to bind to the listen port
    #[error("Failed to bind to port {port}: {reason}")]
    BindError { port: u16, reason: String },

    /// Failed to raise the file-descriptor limit
    #[error("Failed to raise file-descriptor limit to {target}: {reason}")]
    RlimitError { target: u64, reason: String },

    /// Failed to accept a connection
    #[error("Accept error: {0}")]
    AcceptError(String),

    /// I/O error
    #[error("Listener I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl ListenerError {
    /// Check if this error is recoverable
    ///
    /// Accept failures are transient; everything that happens before the
    /// listener is up is fatal.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SocketCreation(_)
            | Self::SocketOption { .. }
            | Self::BindError { .. }
            | Self::RlimitError { .. } => false,
            Self::AcceptError(_) => true,
            Self::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }

    /// Create a socket option error
    pub fn socket_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SocketOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Create a bind error
    pub fn bind(port: u16, reason: impl Into<String>) -> Self {
        Self::BindError {
            port,
            reason: reason.into(),
        }
    }
}

/// TLS setup and per-connection handshake errors
#[derive(Debug, Error)]
pub enum TlsError {
    /// Failed to load certificates from the PEM bundle
    #[error("Failed to load certificate from {path}: {reason}")]
    CertificateLoad { path: String, reason: String },

    /// Failed to load the private key from the PEM bundle
    #[error("Failed to load private key from {path}: {reason}")]
    PrivateKeyLoad { path: String, reason: String },

    /// Failed to generate the self-signed fallback certificate
    #[error("Failed to generate self-signed certificate: {0}")]
    SelfSigned(String),

    /// Invalid TLS configuration
    #[error("Invalid TLS configuration: {0}")]
    InvalidConfig(String),

    /// TLS handshake with a client failed
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
}

impl TlsError {
    /// Handshake failures are per-connection; setup failures are fatal
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::HandshakeFailed(_))
    }

    /// Create a certificate load error
    pub fn certificate_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CertificateLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a private key load error
    pub fn private_key_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PrivateKeyLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// HTTP decoy handshake errors
///
/// Always per-connection: the offending connection is answered with an error
/// response where possible and dropped.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The first buffer did not parse as an HTTP request
    #[error("Malformed HTTP request: {0}")]
    MalformedRequest(String),

    /// The client closed before sending a request
    #[error("Client closed during handshake")]
    ClientClosed,

    /// I/O error during the handshake exchange
    #[error("Handshake I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Upstream connection errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// All connect attempts failed
    #[error("Failed to connect to {addr} after {attempts} attempts: {reason}")]
    ConnectFailed {
        addr: String,
        attempts: u32,
        reason: String,
    },

    /// A single connect attempt timed out
    #[error("Connection to {addr} timed out after {timeout_secs}s")]
    Timeout { addr: SocketAddr, timeout_secs: u64 },

    /// I/O error on the upstream socket
    #[error("Upstream I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl UpstreamError {
    /// Create a connect-failed error
    pub fn connect_failed(
        addr: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            attempts,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_not_recoverable() {
        assert!(!ConfigError::InvalidPort(0).is_recoverable());
        assert!(!ConfigError::InvalidWorkers(0).is_recoverable());
        assert!(!ProxyError::Config(ConfigError::InvalidPort(65536)).is_recoverable());
    }

    #[test]
    fn test_listener_error_recovery() {
        assert!(ListenerError::AcceptError("transient".into()).is_recoverable());
        assert!(!ListenerError::bind(8080, "address in use").is_recoverable());
        assert!(!ListenerError::RlimitError {
            target: 65536,
            reason: "EPERM".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_tls_error_recovery() {
        assert!(TlsError::HandshakeFailed("bad record".into()).is_recoverable());
        assert!(!TlsError::certificate_load("/tmp/x.pem", "no certs").is_recoverable());
    }

    #[test]
    fn test_per_connection_errors_recoverable() {
        let e = ProxyError::Handshake(HandshakeError::ClientClosed);
        assert!(e.is_recoverable());

        let e = ProxyError::Upstream(UpstreamError::connect_failed("127.0.0.1:22", 3, "refused"));
        assert!(e.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let e = ConfigError::InvalidPort(0);
        assert!(e.to_string().contains("Invalid listener port: 0"));

        let e = UpstreamError::connect_failed("127.0.0.1:22", 3, "connection refused");
        let msg = e.to_string();
        assert!(msg.contains("127.0.0.1:22"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let e = ProxyError::Io(io_err);
        assert!(e.is_recoverable());

        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let e = ProxyError::Io(io_err);
        assert!(!e.is_recoverable());
    }
}
