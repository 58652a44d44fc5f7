//! Configuration record
//!
//! All runtime behavior of the proxy is driven by [`ProxyConfig`]. The record
//! is built from CLI flags (and optionally a JSON file), validated once, and
//! then shared read-only across the dispatch loop and workers.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default listener port
pub const DEFAULT_PORT: u16 = 8080;

/// Default worker pool size
pub const DEFAULT_WORKERS: usize = 4;

/// Default forwarder buffer size (bytes per copy iteration)
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Default file-descriptor soft limit target
pub const DEFAULT_ULIMIT: u64 = 65536;

/// Default upstream ports per protocol
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_OPENVPN_PORT: u16 = 1194;
pub const DEFAULT_V2RAY_PORT: u16 = 10086;

/// Canned HTTP decoy response sent on the plain path
pub const DEFAULT_HTTP_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\r\n";

/// Proxy configuration (immutable after startup)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener port
    pub port: u16,

    /// Terminate TLS on accepted connections
    pub use_https: bool,

    /// PEM bundle containing certificate chain and private key.
    /// When absent with `use_https`, a self-signed certificate is generated.
    pub cert_path: Option<String>,

    /// Canned HTTP response body for the plain decoy path
    pub response_body: String,

    /// Worker pool size
    pub workers: usize,

    /// Forwarder buffer bytes (per direction, per session)
    pub buffer_size: usize,

    /// File-descriptor soft limit target
    pub ulimit: u64,

    /// Suppress OpenVPN and V2Ray dispatch; everything bridges to SSH
    pub ssh_only: bool,

    /// Upstream host (usually loopback)
    pub remote_host: String,

    /// SSH upstream port
    pub ssh_port: u16,

    /// OpenVPN upstream port
    pub openvpn_port: u16,

    /// V2Ray upstream port
    pub v2ray_port: u16,

    /// Access token, forwarded to the external validator tooling
    pub token: Option<String>,

    /// Validate the token and exit (delegated to external tooling)
    #[serde(skip)]
    pub validate_only: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            use_https: false,
            cert_path: None,
            response_body: DEFAULT_HTTP_RESPONSE.to_string(),
            workers: DEFAULT_WORKERS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            ulimit: DEFAULT_ULIMIT,
            ssh_only: false,
            remote_host: "127.0.0.1".to_string(),
            ssh_port: DEFAULT_SSH_PORT,
            openvpn_port: DEFAULT_OPENVPN_PORT,
            v2ray_port: DEFAULT_V2RAY_PORT,
            token: None,
            validate_only: false,
            log_level: "info".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - the listener port is 0
    /// - the worker count is 0
    /// - the buffer size is 0
    /// - the upstream host is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(u32::from(self.port)));
        }

        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(self.buffer_size));
        }

        if self.remote_host.is_empty() {
            return Err(ConfigError::InvalidHost(self.remote_host.clone()));
        }

        Ok(())
    }

    /// Human-readable mode string for the startup banner
    #[must_use]
    pub fn mode(&self) -> &'static str {
        if self.use_https {
            "HTTPS"
        } else {
            "HTTP"
        }
    }
}
