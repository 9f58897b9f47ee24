//! Shared transport error type.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors a [`crate::Transport`] implementation can return.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost mid-operation.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A message could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// The peer violated the wire protocol (bad framing, unexpected field).
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The transport has already been closed; no further send/receive will
    /// succeed.
    #[error("transport closed")]
    Closed,

    /// The server rejected the call as unauthorized; carries the parsed
    /// `WWW-Authenticate` challenges, if any were present on the response.
    #[error("authentication required")]
    Unauthorized {
        /// Challenges parsed from the response's `WWW-Authenticate` header(s).
        challenges: Vec<crate::www_authenticate::Challenge>,
    },

    /// Request size exceeds the configured maximum.
    #[error("request size ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    RequestTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// Response size exceeds the configured maximum.
    #[error("response size ({size} bytes) exceeds maximum allowed ({max} bytes)")]
    ResponseTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// An underlying I/O error occurred.
    #[error("io error: {0}")]
    Io(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationFailed(e.to_string())
    }
}

/// Validate a request body against a configured size limit.
pub fn validate_request_size(size: usize, max: Option<usize>) -> TransportResult<()> {
    if let Some(max) = max {
        if size > max {
            return Err(TransportError::RequestTooLarge { size, max });
        }
    }
    Ok(())
}

/// Validate a response body against a configured size limit.
pub fn validate_response_size(size: usize, max: Option<usize>) -> TransportResult<()> {
    if let Some(max) = max {
        if size > max {
            return Err(TransportError::ResponseTooLarge { size, max });
        }
    }
    Ok(())
}
