//! The `Transport` trait implemented by every concrete transport.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TransportResult;

/// A bidirectional, message-oriented channel to an MCP server.
///
/// Every operation takes a [`CancellationToken`] so a caller can abandon an
/// in-flight call; implementations must race cancellation against the
/// underlying I/O and, on cancellation, close whatever handle the I/O was
/// blocked on rather than merely dropping the future (a dropped future alone
/// does not unblock a thread parked in a blocking read).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one framed message.
    async fn send(&self, cancel: &CancellationToken, message: Vec<u8>) -> TransportResult<()>;

    /// Receive the next framed message, waiting for one to arrive.
    async fn receive(&self, cancel: &CancellationToken) -> TransportResult<Vec<u8>>;

    /// Shut the transport down, releasing any underlying connection/process.
    async fn close(&self) -> TransportResult<()>;

    /// Whether the transport currently believes it is connected.
    fn is_connected(&self) -> bool;
}
