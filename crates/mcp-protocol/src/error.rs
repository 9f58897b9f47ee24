//! JSON-RPC error object and the classification surface built on top of it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameter(s).
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// A result alias for fallible MCP client operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// The `error` object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code (see [`error_codes`] for the reserved range).
    pub code: i64,
    /// Short human-readable message.
    pub message: String,
    /// Additional error-specific data, opaque to this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// True if `code` is `METHOD_NOT_FOUND` (-32601).
    pub fn is_method_not_found(&self) -> bool {
        self.code == error_codes::METHOD_NOT_FOUND
    }

    /// True if `code` is `INVALID_PARAMS` (-32602).
    pub fn is_invalid_params(&self) -> bool {
        self.code == error_codes::INVALID_PARAMS
    }

    /// True if `code` falls in the reserved JSON-RPC range (-32768..=-32000),
    /// as opposed to an application-defined error code.
    pub fn is_protocol_error(&self) -> bool {
        (-32768..=-32000).contains(&self.code)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for JsonRpcError {}

/// Errors surfaced by the client-facing API.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum McpError {
    /// The server responded with a JSON-RPC error object.
    #[error("server returned an error: {0}")]
    Rpc(#[from] JsonRpcError),

    /// The client and server could not agree on a protocol version.
    #[error("no common protocol version: client supports {client:?}, server offered {server}")]
    VersionMismatch {
        /// Versions the client is willing to speak, newest first.
        client: Vec<String>,
        /// The version string the server proposed.
        server: String,
    },

    /// A request was sent but no response arrived before the call was cancelled.
    #[error("request cancelled before a response was received")]
    Cancelled,

    /// The response body could not be decoded as JSON-RPC.
    #[error("malformed response: {0}")]
    Decode(String),

    /// A response arrived whose id did not match any in-flight request.
    #[error("response id {0} did not match any pending request")]
    UnknownResponseId(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Every entry in [`crate::SUPPORTED_PROTOCOL_VERSIONS`] was rejected
    /// during the `initialize` handshake.
    #[error("all protocol versions rejected")]
    AllVersionsRejected,
}


/// Discriminant kind for callers that want to `match` without pattern-matching
/// the full [`McpError`] enum (e.g. metrics labeling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`McpError::Rpc`]
    Rpc,
    /// [`McpError::VersionMismatch`]
    VersionMismatch,
    /// [`McpError::Cancelled`]
    Cancelled,
    /// [`McpError::Decode`]
    Decode,
    /// [`McpError::UnknownResponseId`]
    UnknownResponseId,
    /// [`McpError::Transport`]
    Transport,
    /// [`McpError::AllVersionsRejected`]
    AllVersionsRejected,
}

impl McpError {
    /// The [`ErrorKind`] discriminant for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc(_) => ErrorKind::Rpc,
            Self::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Decode(_) => ErrorKind::Decode,
            Self::UnknownResponseId(_) => ErrorKind::UnknownResponseId,
            Self::Transport(_) => ErrorKind::Transport,
            Self::AllVersionsRejected => ErrorKind::AllVersionsRejected,
        }
    }
}
