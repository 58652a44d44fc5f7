//! Response generation for the decoy exchange

use crate::config::ProxyConfig;

use super::websocket::accept_key;

/// The canned decoy response bytes from the configuration
#[must_use]
pub fn canned_response_bytes(config: &ProxyConfig) -> &[u8] {
    config.response_body.as_bytes()
}

/// Build an HTTP error response
///
/// Wire format:
/// `HTTP/1.1 <code> <msg>\r\nContent-Type: text/plain\r\nContent-Length: <n>\r\nConnection: close\r\n\r\n<msg>`
#[must_use]
pub fn error_response(status_code: u16, message: &str) -> String {
    format!(
        "HTTP/1.1 {status_code} {message}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {message}",
        message.len()
    )
}

/// Build the `101 Switching Protocols` response for a WebSocket upgrade
#[must_use]
pub fn websocket_upgrade_response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    )
}
