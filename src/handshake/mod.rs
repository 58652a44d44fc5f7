//! HTTP decoy handshake
//!
//! Every accepted connection starts with a lightweight HTTP exchange: the
//! client sends a request that satisfies captive-portal and CDN
//! intermediaries, the proxy answers with either the canned response or an
//! RFC 6455 `101 Switching Protocols` upgrade, and the same socket then
//! carries the real tunneled bytes.
//!
//! The exchange is a decoy: nothing in the request is routed on, and the
//! response body is operator-configurable.

mod request;
mod response;
pub mod websocket;

pub use request::{parse_request, DecoyRequest};
pub use response::{canned_response_bytes, error_response, websocket_upgrade_response};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::HandshakeError;

/// Dummy key substituted when a minimalist client omits `Sec-WebSocket-Key`
pub const DUMMY_WEBSOCKET_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Methods answered with the canned decoy response
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "HEAD"];

/// What the connection should do after the handshake response was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The socket proceeds to the sniffing phase
    Proceed,
    /// The socket is closed (error response carried `Connection: close`)
    Close,
}

/// Run the decoy exchange on a freshly accepted (and TLS-terminated) stream
///
/// Reads the first plaintext buffer, evaluates it, and writes the matching
/// response. Malformed requests are answered with `400 Bad Request` before
/// the error is returned.
///
/// # Errors
///
/// Returns `HandshakeError` if the client closed before sending a request,
/// the request line did not parse, or the socket failed.
pub async fn exchange<S>(
    stream: &mut S,
    config: &ProxyConfig,
) -> Result<HandshakeOutcome, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; config.buffer_size];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(HandshakeError::ClientClosed);
    }

    let request = match parse_request(&buf[..n]) {
        Ok(request) => request,
        Err(e) => {
            // Best effort: the client may already be gone
            let _ = stream
                .write_all(error_response(400, "Bad Request").as_bytes())
                .await;
            let _ = stream.flush().await;
            return Err(e);
        }
    };

    let (response, outcome): (Vec<u8>, _) = if request.is_websocket_upgrade() {
        let key = match request.websocket_key {
            Some(ref key) => key.as_str(),
            None => {
                warn!("WebSocket upgrade without Sec-WebSocket-Key, using dummy key");
                DUMMY_WEBSOCKET_KEY
            }
        };
        (
            websocket_upgrade_response(key).into_bytes(),
            HandshakeOutcome::Proceed,
        )
    } else if ALLOWED_METHODS.contains(&request.method.as_str()) {
        debug!(method = %request.method, path = %request.path, "Sending canned decoy response");
        (
            canned_response_bytes(config).to_vec(),
            HandshakeOutcome::Proceed,
        )
    } else {
        debug!(method = %request.method, "Method not allowed on decoy path");
        (
            error_response(405, "Method Not Allowed").into_bytes(),
            HandshakeOutcome::Close,
        )
    };

    stream.write_all(&response).await?;
    stream.flush().await?;

    Ok(outcome)
}
