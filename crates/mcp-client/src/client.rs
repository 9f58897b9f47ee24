//! The JSON-RPC client core: request correlation and the `initialize`
//! handshake.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use mcp_protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload, McpError,
    RequestId, Result as McpResult, ToolsCallResult, ToolsListResult, SUPPORTED_PROTOCOL_VERSIONS,
};
use mcp_transport_traits::{Transport, TransportError};

use crate::initialize::{is_version_rejection_message, InitializeResult, ServerInfo};

/// Name this crate identifies itself as in the `initialize` handshake.
const CLIENT_NAME: &str = "mcp-client";
/// Version this crate identifies itself as in the `initialize` handshake.
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A JSON-RPC client over a single [`Transport`].
///
/// Exactly one call is in flight at a time: `call` and `notify` both take an
/// internal lock for their duration, so a second caller blocks until the
/// first's request/response round trip (or notification send) completes.
/// This matches the protocol's single-in-flight-request model rather than
/// the pipelined, request-multiplexed style some JSON-RPC clients use.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use mcp_client::Client;
/// # use mcp_transport_traits::Transport;
/// # tokio_test::block_on(async {
/// # let transport: Arc<dyn Transport> = unimplemented!();
/// let client = Client::new(transport);
/// let cancel = tokio_util::sync::CancellationToken::new();
/// client.initialize(&cancel).await?;
/// let tools = client.list_tools(&cancel).await?;
/// # Ok::<(), mcp_protocol::McpError>(())
/// # });
/// ```
pub struct Client {
    transport: Arc<dyn Transport>,
    next_id: AtomicI64,
    call_lock: AsyncMutex<()>,
    server_info: std::sync::Mutex<Option<ServerInfo>>,
    negotiated_version: std::sync::Mutex<Option<String>>,
}

impl Client {
    /// Wrap a transport. The client does not connect or negotiate a protocol
    /// version until [`Client::initialize`] is called.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(0),
            call_lock: AsyncMutex::new(()),
            server_info: std::sync::Mutex::new(None),
            negotiated_version: std::sync::Mutex::new(None),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn map_transport_err(err: TransportError) -> McpError {
        match err {
            TransportError::Cancelled => McpError::Cancelled,
            other => McpError::Transport(other.to_string()),
        }
    }

    /// Send a request and wait for its matching response.
    ///
    /// Any message received whose id doesn't match this call's id (a stray
    /// notification, or a response to some earlier call that the transport
    /// delivered late) is dropped and the receive loop continues; this keeps
    /// the demultiplexing logic simple since at most one call can be
    /// in-flight at a time under `call_lock`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> McpResult<T> {
        let _guard = self.call_lock.lock().await;
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let body = serde_json::to_vec(&request).map_err(|e| McpError::Decode(e.to_string()))?;

        self.transport
            .send(cancel, body)
            .await
            .map_err(Self::map_transport_err)?;

        loop {
            let raw = self
                .transport
                .receive(cancel)
                .await
                .map_err(Self::map_transport_err)?;

            let response: JsonRpcResponse = match serde_json::from_slice(&raw) {
                Ok(response) => response,
                Err(_) => continue,
            };

            let Some(response_id) = response.id.as_request_id() else {
                continue;
            };
            if *response_id != id {
                continue;
            }

            return match response.payload {
                JsonRpcResponsePayload::Success { result } => {
                    serde_json::from_value(result).map_err(|e| McpError::Decode(e.to_string()))
                }
                JsonRpcResponsePayload::Error { error } => Err(McpError::Rpc(error)),
            };
        }
    }

    /// Send a notification; no response is expected or awaited.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> McpResult<()> {
        let _guard = self.call_lock.lock().await;
        let notification = JsonRpcNotification::new(method, params);
        let body =
            serde_json::to_vec(&notification).map_err(|e| McpError::Decode(e.to_string()))?;
        self.transport
            .send(cancel, body)
            .await
            .map_err(Self::map_transport_err)
    }

    /// Run the `initialize` handshake, trying each entry of
    /// [`SUPPORTED_PROTOCOL_VERSIONS`] in order until the server accepts one.
    ///
    /// A server that rejects a candidate version is expected to answer with
    /// a JSON-RPC error rather than close the connection; this is detected
    /// heuristically since the spec reserves no dedicated error code for it.
    /// Any other RPC error is treated as fatal. On success, sends the
    /// `notifications/initialized` notification the handshake requires.
    pub async fn initialize(&self, cancel: &CancellationToken) -> McpResult<()> {
        for candidate in SUPPORTED_PROTOCOL_VERSIONS {
            let params = json!({
                "protocolVersion": candidate,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": CLIENT_VERSION,
                },
            });

            match self
                .call::<InitializeResult>("initialize", Some(params), cancel)
                .await
            {
                Ok(result) => {
                    *self.server_info.lock().unwrap() = Some(result.server_info);
                    *self.negotiated_version.lock().unwrap() = Some(result.protocol_version);
                    self.notify("notifications/initialized", None, cancel)
                        .await?;
                    return Ok(());
                }
                Err(McpError::Rpc(ref rpc_err)) if is_version_rejection_message(&rpc_err.message) => {
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(McpError::AllVersionsRejected)
    }

    /// Call `tools/list` and return the advertised tools.
    pub async fn list_tools(&self, cancel: &CancellationToken) -> McpResult<Vec<mcp_protocol::Tool>> {
        let result: ToolsListResult = self.call("tools/list", None, cancel).await?;
        Ok(result.tools)
    }

    /// Call `tools/call` for the named tool with the given arguments.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> McpResult<ToolsCallResult> {
        let params = json!({ "name": name, "arguments": arguments });
        self.call("tools/call", Some(params), cancel).await
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> McpResult<()> {
        self.transport.close().await.map_err(Self::map_transport_err)
    }

    /// The server's self-reported identity, once `initialize` has succeeded.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().unwrap().clone()
    }

    /// The protocol version negotiated during `initialize`, if any.
    pub fn negotiated_version(&self) -> Option<String> {
        self.negotiated_version.lock().unwrap().clone()
    }
}
