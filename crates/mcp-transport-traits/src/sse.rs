//! Server-Sent Events framing and field parsing.
//!
//! Parses the `text/event-stream` wire format: events are separated by a
//! blank line, each line is `field: value` (or a `:`-prefixed comment), and
//! `data` fields accumulate across multiple lines joined by `\n`.

use thiserror::Error;

/// One MiB, the cap on a single buffered (but not yet terminated) event.
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Errors the SSE parser can raise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SseError {
    /// An in-progress event exceeded [`MAX_EVENT_SIZE`] before its terminating
    /// blank line arrived.
    #[error("sse event exceeded the {0} byte limit before it was terminated")]
    EventTooLarge(usize),
}

/// A single parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `id:` field, if the event carried one. Persists as the stream's
    /// last-event-id even across events that don't repeat it.
    pub id: Option<String>,
    /// The `event:` field. MCP treats `None`/`Some("message")` as a JSON-RPC
    /// payload and anything else (e.g. `"endpoint"`) specially.
    pub event: Option<String>,
    /// The `data:` field(s), joined with `\n`. Empty if the event carried no
    /// data lines, in which case the event should be discarded by the caller.
    pub data: String,
}

impl SseEvent {
    /// True if this event carried no `data:` lines and should be ignored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Incremental SSE parser over a byte stream.
///
/// Feed it chunks as they arrive with [`push`](Self::push); it returns every
/// complete event found in the chunk, buffering a trailing partial event
/// across calls.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes (assumed UTF-8; invalid bytes are replaced per
    /// `String::from_utf8_lossy`) and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, SseError> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        // An event ends at a blank line, i.e. two consecutive newlines.
        // CRLF and bare LF are both accepted; normalize first.
        let normalized = self.buffer.replace("\r\n", "\n").replace('\r', "\n");
        self.buffer = normalized;

        loop {
            match self.buffer.find("\n\n") {
                Some(pos) => {
                    let raw_event: String = self.buffer.drain(..pos).collect();
                    // drain the separating blank line itself
                    if self.buffer.starts_with("\n\n") {
                        self.buffer.drain(..2);
                    } else if self.buffer.starts_with('\n') {
                        self.buffer.drain(..1);
                    }
                    if let Some(event) = parse_event(&raw_event) {
                        events.push(event);
                    }
                }
                None => break,
            }
        }

        if self.buffer.len() > MAX_EVENT_SIZE {
            return Err(SseError::EventTooLarge(MAX_EVENT_SIZE));
        }

        Ok(events)
    }
}

/// Parse one already-delimited event block (no trailing blank line) into its
/// fields, skipping `:`-prefixed comment lines.
fn parse_event(block: &str) -> Option<SseEvent> {
    let mut id = None;
    let mut event = None;
    let mut data_lines: Vec<String> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.find(':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                let value = value.strip_prefix(' ').unwrap_or(value);
                (&line[..colon], value)
            }
            None => (line, ""),
        };

        match field {
            "id" => id = Some(value.to_string()),
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value.to_string()),
            // "retry" and unknown fields are not part of this client's
            // contract and are ignored.
            _ => {}
        }
    }

    if data_lines.is_empty() && id.is_none() && event.is_none() {
        return None;
    }

    Some(SseEvent {
        id,
        event,
        data: data_lines.join("\n"),
    })
}
