//! The HTTP transport itself: POST + inline SSE/JSON response routing,
//! session-id capture, and protocol-version fallback.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex as SyncMutex;
use reqwest::{header, StatusCode};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use mcp_protocol::{next_fallback_version, SUPPORTED_PROTOCOL_VERSIONS};
use mcp_transport_traits::{
    parse_www_authenticate, validate_request_size, Challenge, SseError, SseParser, Transport,
    TransportError, TransportResult,
};

use crate::config::HttpTransportConfig;
use crate::legacy_sse::legacy_sse_reader;
use crate::session::SessionState;

/// Bound on the message channel fed by inline/legacy SSE and inline JSON
/// responses, per spec §4.3.
const MESSAGE_CHANNEL_CAPACITY: usize = 100;
/// Cap applied when reading an error response body for diagnostics.
const ERROR_BODY_CAP: usize = 1024;

/// HTTP transport: POSTs JSON-RPC requests, routing the response as either
/// a single JSON body or an inline SSE stream, with session-id capture and
/// protocol-version fallback negotiation.
pub struct HttpTransport {
    config: HttpTransportConfig,
    rpc_client: reqwest::Client,
    stream_client: reqwest::Client,
    state: Arc<SyncMutex<SessionState>>,
    msg_tx: mpsc::Sender<Vec<u8>>,
    msg_rx: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
    err_tx: mpsc::Sender<TransportError>,
    err_rx: AsyncMutex<mpsc::Receiver<TransportError>>,
    shutdown: CancellationToken,
    legacy_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.config.base_url)
            .field("closed", &self.state.lock().closed)
            .finish()
    }
}

impl HttpTransport {
    /// Build a transport from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Internal`] if a caller-supplied client
    /// couldn't be used and no internal client could be built (this only
    /// happens if the TLS backend is unavailable).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use mcp_http::{HttpTransport, HttpTransportConfig};
    /// # use mcp_transport_traits::Transport;
    /// # tokio_test::block_on(async {
    /// let config = HttpTransportConfig::new(url::Url::parse("https://mcp.example.com")?);
    /// let transport = HttpTransport::new(config)?;
    /// let cancel = tokio_util::sync::CancellationToken::new();
    /// transport.send(&cancel, br#"{"jsonrpc":"2.0"}"#.to_vec()).await?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// # });
    /// ```
    pub fn new(config: HttpTransportConfig) -> TransportResult<Self> {
        // Two clones of one underlying client: reqwest::Client shares its
        // connection pool cheaply across clones, and the spec calls for a
        // dedicated client each for RPC calls and for long-lived streaming
        // reads, both with their whole-request timeout cleared (connection
        // and header timeouts still apply via the pooled connector).
        let base_client = match &config.http_client {
            Some(client) => client.clone(),
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| TransportError::Internal(e.to_string()))?,
        };
        let rpc_client = base_client.clone();
        let stream_client = base_client;

        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            rpc_client,
            stream_client,
            state: Arc::new(SyncMutex::new(SessionState::default())),
            msg_tx,
            msg_rx: AsyncMutex::new(msg_rx),
            err_tx,
            err_rx: AsyncMutex::new(err_rx),
            shutdown: CancellationToken::new(),
            legacy_task: AsyncMutex::new(None),
        })
    }

    /// The protocol version the server has most recently accepted, if any.
    pub fn negotiated_version(&self) -> Option<String> {
        self.state.lock().negotiated_version.clone()
    }

    /// The session id captured from `Mcp-Session-Id`, if any.
    pub fn session_id(&self) -> Option<String> {
        self.state.lock().session_id.clone()
    }

    /// The `id:` of the last SSE event observed, if any.
    pub fn last_event_id(&self) -> Option<String> {
        self.state.lock().last_event_id.clone()
    }

    /// Connect to a legacy server that delivers its POST endpoint via a
    /// long-lived GET SSE stream carrying an `event: endpoint` payload,
    /// per spec §4.3 "Legacy SSE (optional)".
    ///
    /// Returns once the endpoint has been discovered (or the stream ends
    /// without ever sending one). This performs a single connection attempt;
    /// per the spec's Non-goal on stateful SSE resumption, no reconnect loop
    /// is run if the stream drops afterward.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the initial GET fails.
    pub async fn connect_legacy_sse(&self) -> TransportResult<()> {
        let ready = Arc::new(tokio::sync::Notify::new());
        let headers = self.build_headers(&self.current_candidate_version(), None, None)?;
        let response = self
            .stream_client
            .get(self.config.base_url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::ConnectionFailed(format!(
                "legacy SSE GET failed: {}",
                response.status()
            )));
        }

        let state = Arc::clone(&self.state);
        let msg_tx = self.msg_tx.clone();
        let err_tx = self.err_tx.clone();
        let shutdown = self.shutdown.clone();
        let base_url = self.config.base_url.clone();
        let ready_signal = Arc::clone(&ready);

        let handle = tokio::spawn(async move {
            legacy_sse_reader(response, state, msg_tx, err_tx, shutdown, base_url, ready_signal).await;
        });
        *self.legacy_task.lock().await = Some(handle);

        ready.notified().await;
        Ok(())
    }

    fn current_candidate_version(&self) -> String {
        self.state
            .lock()
            .negotiated_version
            .clone()
            .unwrap_or_else(|| SUPPORTED_PROTOCOL_VERSIONS[0].to_string())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    async fn resolve_token(&self, cancel: &CancellationToken) -> TransportResult<Option<String>> {
        if let Some(provider) = &self.config.token_provider {
            return provider.token(cancel).await.map(Some);
        }
        Ok(self.config.bearer_token.clone())
    }

    /// Build the POST URL per spec §4.3: legacy endpoint first, then a
    /// `sessionId` query param, then the bare base URL.
    fn build_url(&self) -> TransportResult<Url> {
        let state = self.state.lock();
        if let Some(endpoint) = &state.endpoint_url {
            return self
                .config
                .base_url
                .join(endpoint)
                .map_err(|e| TransportError::ProtocolError(format!("invalid endpoint url: {e}")));
        }
        if let Some(session_id) = &state.session_id {
            let mut url = self.config.base_url.clone();
            url.query_pairs_mut().append_pair("sessionId", session_id);
            return Ok(url);
        }
        Ok(self.config.base_url.clone())
    }

    fn build_headers(
        &self,
        candidate_version: &str,
        token: Option<&str>,
        session_id: Option<&str>,
    ) -> TransportResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(
            "MCP-Protocol-Version",
            header::HeaderValue::from_str(candidate_version)
                .map_err(|e| TransportError::Internal(e.to_string()))?,
        );
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::Internal(e.to_string()))?,
            );
        }
        if let Some(session_id) = session_id {
            headers.insert(
                "Mcp-Session-Id",
                header::HeaderValue::from_str(session_id)
                    .map_err(|e| TransportError::Internal(e.to_string()))?,
            );
        }
        for (name, value) in &self.config.headers {
            let header_name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Internal(e.to_string()))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| TransportError::Internal(e.to_string()))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    fn parse_all_www_authenticate(&self, headers: &header::HeaderMap) -> Vec<Challenge> {
        headers
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| parse_www_authenticate(value).ok())
            .flatten()
            .collect()
    }

    async fn enqueue(&self, data: Vec<u8>, cancel: &CancellationToken) -> TransportResult<()> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Ok(()),
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.msg_tx.send(data) => result.map_err(|_| TransportError::Closed),
        }
    }

    async fn consume_sse_body(
        &self,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> TransportResult<()> {
        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                () = self.shutdown.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    let events = parser.push(&bytes).map_err(|SseError::EventTooLarge(max)| {
                        TransportError::ResponseTooLarge {
                            size: max + 1,
                            max,
                        }
                    })?;
                    for event in events {
                        if let Some(id) = event.id {
                            self.state.lock().last_event_id = Some(id);
                        }
                        let is_message = matches!(event.event.as_deref(), None | Some("message"));
                        if is_message && !event.data.is_empty() {
                            self.enqueue(event.data.into_bytes(), cancel).await?;
                        }
                    }
                }
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Ok(()),
            }
        }
    }

    async fn dispatch_response(
        &self,
        response: reqwest::Response,
        cancel: &CancellationToken,
    ) -> TransportResult<()> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            self.consume_sse_body(response, cancel).await
        } else if content_type.starts_with("application/json") {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            self.enqueue(bytes.to_vec(), cancel).await
        } else {
            // Other or absent content type: drain and discard per spec.
            let _ = response.bytes().await;
            Ok(())
        }
    }
}

async fn read_bounded_text(response: reqwest::Response, cap: usize) -> String {
    match response.bytes().await {
        Ok(bytes) => {
            let truncated = &bytes[..bytes.len().min(cap)];
            String::from_utf8_lossy(truncated).into_owned()
        }
        Err(_) => String::new(),
    }
}

fn is_version_rejection_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    (lower.contains("unsupported") && lower.contains("version"))
        || lower.contains("protocol-version")
        || lower.contains("protocolversion")
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, cancel: &CancellationToken, message: Vec<u8>) -> TransportResult<()> {
        validate_request_size(message.len(), Some(mcp_protocol::MAX_MESSAGE_SIZE))?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let token = self.resolve_token(cancel).await?;
        let url = self.build_url()?;
        let mut candidate = self.current_candidate_version();

        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            let session_id = self.state.lock().session_id.clone();
            let headers = self.build_headers(&candidate, token.as_deref(), session_id.as_deref())?;

            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                () = self.shutdown.cancelled() => return Err(TransportError::Closed),
                result = self.rpc_client.post(url.clone()).headers(headers).body(message.clone()).send() => {
                    result.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
                }
            };

            let status = response.status();

            if status == StatusCode::BAD_REQUEST {
                let body = read_bounded_text(response, ERROR_BODY_CAP).await;
                if is_version_rejection_body(&body) {
                    self.state.lock().negotiated_version = None;
                    match next_fallback_version(&candidate) {
                        Some(next) => {
                            debug!(from = %candidate, to = %next.0, "falling back to an older protocol version");
                            candidate = next.0;
                            continue;
                        }
                        None => {
                            return Err(TransportError::ProtocolError(
                                "all protocol versions rejected".to_string(),
                            ))
                        }
                    }
                }
                return Err(TransportError::ProtocolError(format!("HTTP 400: {body}")));
            }

            if status == StatusCode::UNAUTHORIZED {
                let challenges = self.parse_all_www_authenticate(response.headers());
                return Err(TransportError::Unauthorized { challenges });
            }

            if !status.is_success() {
                let body = read_bounded_text(response, ERROR_BODY_CAP).await;
                return Err(TransportError::ProtocolError(format!("HTTP {status}: {body}")));
            }

            if let Some(session_id) = response
                .headers()
                .get("Mcp-Session-Id")
                .and_then(|v| v.to_str().ok())
            {
                self.state.lock().session_id = Some(session_id.to_string());
            }
            self.state.lock().negotiated_version = Some(candidate.clone());

            return self.dispatch_response(response, cancel).await;
        }
    }

    async fn receive(&self, cancel: &CancellationToken) -> TransportResult<Vec<u8>> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut msg_rx = self.msg_rx.lock().await;
        let mut err_rx = self.err_rx.lock().await;
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(TransportError::Closed),
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            msg = msg_rx.recv() => msg.ok_or(TransportError::Closed),
            err = err_rx.recv() => Err(err.unwrap_or(TransportError::Closed)),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        let already_closed = {
            let mut state = self.state.lock();
            let was = state.closed;
            state.closed = true;
            was
        };
        if already_closed {
            return Ok(());
        }
        self.shutdown.cancel();
        if let Some(handle) = self.legacy_task.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "legacy SSE reader task panicked during close");
            }
        }

        let session_id = self.state.lock().session_id.clone();
        if let Some(session_id) = session_id {
            if let Ok(url) = self.build_url() {
                let mut headers = header::HeaderMap::new();
                if let Ok(session_value) = header::HeaderValue::from_str(&session_id) {
                    headers.insert("Mcp-Session-Id", session_value);
                }
                let _ = self.rpc_client.delete(url).headers(headers).send().await;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_unsupported_version_phrasing() {
        assert!(is_version_rejection_body("Unsupported MCP-Protocol-Version"));
        assert!(is_version_rejection_body("unsupported protocol VERSION requested"));
    }

    #[test]
    fn detects_protocol_version_camel_and_kebab() {
        assert!(is_version_rejection_body("missing protocolVersion header"));
        assert!(is_version_rejection_body("missing protocol-version header"));
    }

    #[test]
    fn other_400_bodies_are_not_version_rejections() {
        assert!(!is_version_rejection_body("invalid request: missing method"));
    }

    #[tokio::test]
    async fn new_transport_starts_connected_and_unclosed() {
        let config = HttpTransportConfig::new(Url::parse("http://127.0.0.1:1").unwrap());
        let transport = HttpTransport::new(config).unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.negotiated_version(), None);
        assert_eq!(transport.session_id(), None);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let config = HttpTransportConfig::new(Url::parse("http://127.0.0.1:1").unwrap());
        let transport = HttpTransport::new(config).unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_after_close_fails_without_panicking() {
        let config = HttpTransportConfig::new(Url::parse("http://127.0.0.1:1").unwrap());
        let transport = HttpTransport::new(config).unwrap();
        transport.close().await.unwrap();
        let cancel = CancellationToken::new();
        let err = transport.send(&cancel, b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
