//! HTTP transport for MCP: POST requests with inline JSON or SSE response
//! framing, session-id capture, and protocol-version fallback negotiation.

mod config;
mod legacy_sse;
mod session;
mod transport;

pub use config::{HttpTransportConfig, TokenProvider};
pub use transport::HttpTransport;
