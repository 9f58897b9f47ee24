//! Mutable session state shared by the `send` caller, the legacy SSE reader,
//! and `close` — all mutated only while holding `HttpTransport::state`'s lock.

/// `{sessionID?, endpointURL?, lastEventID?, negotiatedVersion?}` plus the
/// closed flag, matching the spec's HTTP session state exactly.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Captured from the `Mcp-Session-Id` response header.
    pub session_id: Option<String>,
    /// Captured from a legacy `event: endpoint` SSE payload.
    pub endpoint_url: Option<String>,
    /// The `id:` of the last SSE event seen, for informational/reconnect use.
    pub last_event_id: Option<String>,
    /// The protocol version the server has accepted, if any.
    pub negotiated_version: Option<String>,
    /// Set exactly once by `close`; all operations after this fail fast.
    pub closed: bool,
}
