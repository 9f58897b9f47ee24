//! Shared transport primitives: the `Transport` trait, the SSE event parser,
//! and the `WWW-Authenticate` challenge parser.

mod error;
mod sse;
mod transport;
mod www_authenticate;

pub use error::{validate_request_size, validate_response_size, TransportError, TransportResult};
pub use sse::{SseError, SseEvent, SseParser, MAX_EVENT_SIZE};
pub use transport::Transport;
pub use www_authenticate::{find_bearer, parse as parse_www_authenticate, Challenge, WwwAuthenticateError};
