//! Byte-signature classification
//!
//! The classifier looks at the first bytes a client sends after the HTTP
//! decoy exchange and decides which upstream should receive the stream.

use std::time::Duration;

use super::kind::ProtocolKind;

/// Bytes examined by the classifier
pub const SNIFF_BUFFER_SIZE: usize = 16;

/// Read timeout for the sniff buffer
pub const SNIFF_TIMEOUT: Duration = Duration::from_secs(2);

/// High-bit threshold for the VMess entropy heuristic: more than this many of
/// the first 16 bytes with the top bit set reads as an encrypted header.
const VMESS_HIGH_BYTE_THRESHOLD: usize = 8;

/// Classify an initial byte buffer
///
/// Pure function: the buffer is only inspected, never modified. The caller
/// replays the same bytes as the first write toward the selected upstream.
///
/// The VMess entropy check is best effort and can misclassify other
/// high-entropy streams; deployments that only serve SSH should set
/// `ssh_only` and use [`classify_with_mode`] instead.
#[must_use]
pub fn classify(buf: &[u8]) -> ProtocolKind {
    // SSH identification string, RFC 4253 §4.2
    if buf.starts_with(b"SSH-") {
        return ProtocolKind::Ssh;
    }

    if buf.len() >= 2 {
        // P_CONTROL_HARD_RESET_* opcodes occupy the high nibble
        let opcode = buf[0] & 0xF0;
        if opcode == 0x20 || opcode == 0x30 {
            return ProtocolKind::OpenVpn;
        }

        // TCP-framed OpenVPN: two-byte big-endian length prefix
        if buf[0] == 0x00 && buf[1] > 0x00 {
            return ProtocolKind::OpenVpn;
        }
    }

    if buf.len() >= SNIFF_BUFFER_SIZE {
        let high_bytes = buf[..SNIFF_BUFFER_SIZE]
            .iter()
            .filter(|b| **b & 0x80 != 0)
            .count();

        if high_bytes > VMESS_HIGH_BYTE_THRESHOLD || (buf[0] == 0x01 && buf[1] == 0x00) {
            return ProtocolKind::V2Ray;
        }
    }

    ProtocolKind::Unknown
}

/// Classify with the `ssh_only` mode applied
///
/// With `ssh_only` set, every outcome collapses to SSH so that OpenVPN and
/// V2Ray upstreams are never dialed.
#[must_use]
pub fn classify_with_mode(buf: &[u8], ssh_only: bool) -> ProtocolKind {
    if ssh_only {
        return ProtocolKind::Ssh;
    }
    classify(buf)
}
