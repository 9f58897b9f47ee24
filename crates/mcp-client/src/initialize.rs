//! Wire shapes for the `initialize` handshake.

use serde::Deserialize;

/// `serverInfo` as advertised in a successful `initialize` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// The server's self-reported name.
    pub name: String,
    /// The server's self-reported version string.
    pub version: String,
}

/// The decoded `result` of an `initialize` call.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// The protocol version the server accepted.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// The server's identity.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Heuristic detection of a version-rejection error per spec §4.5: servers
/// don't use a standard error code for this, so the client matches on a
/// small, deliberately narrow substring set in the error message.
pub(crate) fn is_version_rejection_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    (lower.contains("protocol") && lower.contains("version")) || lower.contains("unsupported version")
}
