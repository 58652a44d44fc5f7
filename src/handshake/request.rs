//! Decoy request parsing
//!
//! Parses the first buffer of a connection far enough to pick a response:
//! request line, upgrade headers, and the WebSocket key. Anything beyond that
//! is ignored; this is not an HTTP server.

use crate::error::HandshakeError;

/// Maximum number of headers examined
const MAX_HEADERS: usize = 64;

/// The parsed decoy request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoyRequest {
    /// Request method (GET, POST, ...)
    pub method: String,
    /// Request path
    pub path: String,
    /// Minor HTTP version (1 for HTTP/1.1)
    pub version: u8,
    /// `Upgrade` header named `websocket` or `ws`
    pub has_upgrade_header: bool,
    /// `Connection` header containing `upgrade`
    pub has_connection_upgrade: bool,
    /// Trimmed `Sec-WebSocket-Key` value, when present
    pub websocket_key: Option<String>,
}

impl DecoyRequest {
    /// Whether this request asks for a WebSocket upgrade
    ///
    /// Both the `Upgrade` and `Connection` headers must agree.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.has_upgrade_header && self.has_connection_upgrade
    }
}

/// Parse the first buffer of a connection as an HTTP request
///
/// Partial requests are accepted as long as the request line is complete;
/// tunneling clients routinely send the bare minimum.
///
/// # Errors
///
/// Returns `HandshakeError::MalformedRequest` if the request line does not
/// parse as `METHOD SP PATH SP VERSION`.
pub fn parse_request(buf: &[u8]) -> Result<DecoyRequest, HandshakeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(_) | httparse::Status::Partial) => {}
        Err(e) => {
            return Err(HandshakeError::MalformedRequest(format!("{e:?}")));
        }
    }

    let (Some(method), Some(path), Some(version)) = (req.method, req.path, req.version) else {
        return Err(HandshakeError::MalformedRequest(
            "incomplete request line".into(),
        ));
    };

    let mut parsed = DecoyRequest {
        method: method.to_string(),
        path: path.to_string(),
        version,
        has_upgrade_header: false,
        has_connection_upgrade: false,
        websocket_key: None,
    };

    for header in req.headers.iter() {
        if header.name.eq_ignore_ascii_case("upgrade") {
            if let Ok(value) = std::str::from_utf8(header.value) {
                let value = value.trim();
                if value.eq_ignore_ascii_case("websocket") || value.eq_ignore_ascii_case("ws") {
                    parsed.has_upgrade_header = true;
                }
            }
        } else if header.name.eq_ignore_ascii_case("connection") {
            if let Ok(value) = std::str::from_utf8(header.value) {
                // "Connection: keep-alive, Upgrade" is valid
                if value.to_ascii_lowercase().contains("upgrade") {
                    parsed.has_connection_upgrade = true;
                }
            }
        } else if header.name.eq_ignore_ascii_case("sec-websocket-key") {
            if let Ok(value) = std::str::from_utf8(header.value) {
                let value = value.trim();
                if !value.is_empty() {
                    parsed.websocket_key = Some(value.to_string());
                }
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_get() {
        let req = parse_request(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/");
        assert_eq!(req.version, 1);
        assert!(!req.is_websocket_upgrade());
        assert!(req.websocket_key.is_none());
    }

    #[test]
    fn test_parse_websocket_upgrade() {
        let req = parse_request(
            b"GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .unwrap();
        assert!(req.is_websocket_upgrade());
        assert_eq!(
            req.websocket_key.as_deref(),
            Some("dGhlIHNhbXBsZSBub25jZQ==")
        );
    }

    #[test]
    fn test_parse_upgrade_ws_shorthand() {
        let req = parse_request(
            b"GET / HTTP/1.1\r\nUpgrade: ws\r\nConnection: keep-alive, Upgrade\r\n\r\n",
        )
        .unwrap();
        assert!(req.is_websocket_upgrade());
    }

    #[test]
    fn test_parse_upgrade_needs_both_headers() {
        // Upgrade without Connection: upgrade is the plain path
        let req = parse_request(b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n").unwrap();
        assert!(!req.is_websocket_upgrade());

        let req = parse_request(b"GET / HTTP/1.1\r\nConnection: Upgrade\r\n\r\n").unwrap();
        assert!(!req.is_websocket_upgrade());
    }

    #[test]
    fn test_parse_upgrade_case_insensitive() {
        let req = parse_request(
            b"GET / HTTP/1.1\r\nUPGRADE: WebSocket\r\nCONNECTION: UPGRADE\r\n\r\n",
        )
        .unwrap();
        assert!(req.is_websocket_upgrade());
    }

    #[test]
    fn test_parse_websocket_key_trimmed() {
        let req = parse_request(
            b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key:   abc123==  \r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.websocket_key.as_deref(), Some("abc123=="));
    }

    #[test]
    fn test_parse_malformed_binary() {
        let result = parse_request(b"\x00\x00\x00\x00\r\n\r\n");
        assert!(matches!(result, Err(HandshakeError::MalformedRequest(_))));
    }

    #[test]
    fn test_parse_missing_version() {
        let result = parse_request(b"GET /\r\n\r\n");
        assert!(matches!(result, Err(HandshakeError::MalformedRequest(_))));
    }

    #[test]
    fn test_parse_partial_with_complete_request_line() {
        // Request line complete, headers cut off mid-way
        let req = parse_request(b"GET / HTTP/1.1\r\nHost: exam").unwrap();
        assert_eq!(req.method, "GET");
    }

    #[test]
    fn test_parse_empty_buffer() {
        let result = parse_request(b"");
        assert!(matches!(result, Err(HandshakeError::MalformedRequest(_))));
    }

    #[test]
    fn test_parse_non_upgrade_methods() {
        for method in ["POST", "HEAD", "PUT", "DELETE", "OPTIONS"] {
            let raw = format!("{method} / HTTP/1.1\r\nHost: x\r\n\r\n");
            let req = parse_request(raw.as_bytes()).unwrap();
            assert_eq!(req.method, method);
            assert!(!req.is_websocket_upgrade());
        }
    }
}
