//! RFC 6455 accept-key computation

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing (RFC 6455 §4.2.2)
pub const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute `Sec-WebSocket-Accept` for a client key
///
/// `base64(SHA1(key ∥ MAGIC))`, with the key used exactly as received
/// (already trimmed by the request parser).
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_MAGIC.as_bytes());
    BASE64.encode(hasher.finalize())
}
