//! MCP JSON-RPC message types, protocol version negotiation, and error taxonomy.
//!
//! This crate has no transport or I/O dependencies: it only defines the wire
//! shapes and types shared by every transport and by the client.

mod error;
mod request_id;
mod rpc;
mod tool;
mod version;

/// Default cap on a single framed message, in bytes, applied by transports
/// that don't negotiate their own limit.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

pub use error::{ErrorKind, JsonRpcError, McpError, Result};
pub use request_id::RequestId;
pub use rpc::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload,
    JsonRpcVersion, ResponseId, JSONRPC_VERSION,
};
pub use tool::{ContentBlock, Tool, ToolsCallResult, ToolsListResult};
pub use version::{
    latest_protocol_version, next_fallback_version, ProtocolVersion, SUPPORTED_PROTOCOL_VERSIONS,
};
