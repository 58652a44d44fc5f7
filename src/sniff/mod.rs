//! Protocol sniffing
//!
//! This module classifies the first application bytes of a client stream as
//! one of the tunneled protocols so the dispatcher can pick the right
//! upstream. Classification is a pure function of the initial buffer: the
//! bytes are never modified and are replayed verbatim toward the upstream.
//!
//! # Supported signatures
//!
//! - SSH: the `SSH-` identification-string prefix
//! - OpenVPN: P_CONTROL_HARD_RESET opcode nibbles or the TCP length prefix
//! - V2Ray (VMess): high-entropy header heuristic (best effort)
//!
//! # Example
//!
//! ```
//! use multiflow_proxy::sniff::{classify, ProtocolKind};
//!
//! assert_eq!(classify(b"SSH-2.0-OpenSSH_9.6\r\n"), ProtocolKind::Ssh);
//! assert_eq!(classify(&[0x38, 0x01, 0x00]), ProtocolKind::OpenVpn);
//! ```

mod detect;
mod kind;

pub use detect::{classify, classify_with_mode, SNIFF_BUFFER_SIZE, SNIFF_TIMEOUT};
pub use kind::ProtocolKind;
