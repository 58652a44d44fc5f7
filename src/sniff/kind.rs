//! Protocol kind tag
//!
//! A tagged enumeration of the tunneled protocols this proxy recognizes.
//! Unknown traffic is dispatched to the SSH upstream, matching the behavior
//! operators expect from minimalist tunneling clients.

use serde::{Deserialize, Serialize};

/// Detected tunneled protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// SSH (identification string prefix)
    Ssh,
    /// OpenVPN over TCP
    OpenVpn,
    /// V2Ray (VMess)
    V2Ray,
    /// Unrecognized traffic (bridged to SSH)
    Unknown,
}

impl ProtocolKind {
    /// Get the protocol name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::OpenVpn => "openvpn",
            Self::V2Ray => "v2ray",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this kind falls back to the SSH upstream
    #[must_use]
    pub const fn is_ssh_fallback(&self) -> bool {
        matches!(self, Self::Ssh | Self::Unknown)
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
