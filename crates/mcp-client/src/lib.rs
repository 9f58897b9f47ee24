//! The JSON-RPC client: request-id allocation, single-in-flight-call
//! serialization, response/notification demultiplexing, and the
//! `initialize` handshake with protocol-version fallback.

mod client;
mod initialize;

pub use client::Client;
pub use initialize::{InitializeResult, ServerInfo};
