//! Newline-delimited JSON transport for MCP over a child process's
//! stdin/stdout, or any other duplex byte stream.

mod transport;

pub use transport::StdioTransport;
