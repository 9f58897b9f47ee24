//! Protocol version negotiation.

use std::fmt;

/// An MCP protocol version string, e.g. `"2025-06-18"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub String);

impl ProtocolVersion {
    /// Wrap a version string.
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProtocolVersion {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Protocol versions this client offers during `initialize`, newest first.
///
/// On a version mismatch the client retries the handshake with each older
/// entry in turn before giving up.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

/// The version offered first, i.e. `SUPPORTED_PROTOCOL_VERSIONS[0]`.
pub fn latest_protocol_version() -> ProtocolVersion {
    ProtocolVersion::new(SUPPORTED_PROTOCOL_VERSIONS[0])
}

/// The version immediately older than `current`, if any remain to try.
pub fn next_fallback_version(current: &str) -> Option<ProtocolVersion> {
    let idx = SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .position(|v| *v == current)?;
    SUPPORTED_PROTOCOL_VERSIONS
        .get(idx + 1)
        .map(|v| ProtocolVersion::new(*v))
}
