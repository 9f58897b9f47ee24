//! Newline-delimited JSON transport over stdin/stdout.
//!
//! # Interior mutability
//!
//! Following the same hybrid pattern as the rest of this crate family:
//! `std::sync::Mutex` guards state that is only ever touched inside a
//! non-`.await` critical section; the I/O streams themselves live behind a
//! `tokio::sync::Mutex` since reading/writing them crosses `.await`.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use mcp_protocol::MAX_MESSAGE_SIZE;
use mcp_transport_traits::{validate_request_size, validate_response_size, Transport, TransportError, TransportResult};

type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type StdinReader = FramedRead<BufReader<BoxedAsyncRead>, LinesCodec>;
type StdoutWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;

/// Newline-delimited JSON transport: one JSON-RPC message per line.
///
/// Constructed either over a spawned child's stdin/stdout ([`Self::from_child`])
/// or over arbitrary raw duplex streams ([`Self::from_raw`]).
pub struct StdioTransport {
    reader: Arc<TokioMutex<StdinReader>>,
    writer: Arc<TokioMutex<StdoutWriter>>,
    connected: Arc<AtomicBool>,
    max_message_size: usize,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

impl StdioTransport {
    /// Build a transport from a spawned child's piped stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the child wasn't
    /// spawned with `stdin(Stdio::piped())`/`stdout(Stdio::piped())`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use mcp_stdio::StdioTransport;
    /// # use mcp_transport_traits::Transport;
    /// # use tokio::process::Command;
    /// # tokio_test::block_on(async {
    /// let mut child = Command::new("mcp-server")
    ///     .stdin(std::process::Stdio::piped())
    ///     .stdout(std::process::Stdio::piped())
    ///     .spawn()?;
    /// let transport = StdioTransport::from_child(&mut child)?;
    /// let cancel = tokio_util::sync::CancellationToken::new();
    /// transport.send(&cancel, br#"{"jsonrpc":"2.0"}"#.to_vec()).await?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// # });
    /// ```
    pub fn from_child(child: &mut Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConnectionFailed(
                "child stdin was not piped; spawn with Stdio::piped()".to_string(),
            )
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConnectionFailed(
                "child stdout was not piped; spawn with Stdio::piped()".to_string(),
            )
        })?;
        Ok(Self::from_raw(stdout, stdin))
    }

    /// Build a transport from arbitrary raw duplex streams.
    ///
    /// `reader` is the stream messages arrive on (e.g. a child's stdout);
    /// `writer` is the stream messages are sent on (e.g. a child's stdin).
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        let boxed_reader: BoxedAsyncRead = Box::pin(reader);
        let boxed_writer: BoxedAsyncWrite = Box::pin(writer);
        let framed_reader = FramedRead::new(
            BufReader::new(boxed_reader),
            LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE),
        );
        let framed_writer = FramedWrite::new(boxed_writer, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE));

        Self {
            reader: Arc::new(TokioMutex::new(framed_reader)),
            writer: Arc::new(TokioMutex::new(framed_writer)),
            connected: Arc::new(AtomicBool::new(true)),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, cancel: &CancellationToken, message: Vec<u8>) -> TransportResult<()> {
        validate_request_size(message.len(), Some(self.max_message_size))?;
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let line = String::from_utf8(message)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;

        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            result = writer.send(line) => {
                result.map_err(|e| TransportError::SendFailed(e.to_string()))
            }
        }
    }

    async fn receive(&self, cancel: &CancellationToken) -> TransportResult<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut reader = self.reader.lock().await;
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                trace!("stdio receive cancelled while waiting for a line");
                return Err(TransportError::Cancelled);
            }
            next = reader.next() => next,
        };

        match line {
            Some(Ok(line)) => {
                let bytes = line.into_bytes();
                validate_response_size(bytes.len(), Some(self.max_message_size))?;
                debug!(bytes = bytes.len(), "received stdio line");
                Ok(bytes)
            }
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            None => {
                self.connected.store(false, Ordering::Relaxed);
                Err(TransportError::ConnectionLost("stdin/stdout closed".to_string()))
            }
        }
    }

    async fn close(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::Relaxed);
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            warn!(error = %e, "error closing stdio writer");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
