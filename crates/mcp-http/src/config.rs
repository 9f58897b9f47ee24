//! HTTP transport configuration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use mcp_transport_traits::TransportResult;

/// Supplies a bearer token on demand, for servers whose access token is
/// refreshed out from under a long-lived transport (see `mcp-auth`'s token
/// manager). When both a static token and a provider are configured, the
/// provider wins.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce the bearer token to use for the next request.
    async fn token(&self, cancel: &CancellationToken) -> TransportResult<String>;
}

/// Configuration for [`crate::HttpTransport`].
#[derive(Clone)]
pub struct HttpTransportConfig {
    /// The MCP server's base endpoint URL.
    pub base_url: Url,
    /// A fixed bearer token, used when no [`TokenProvider`] is configured.
    pub bearer_token: Option<String>,
    /// An async token source, consulted instead of `bearer_token` when set.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// Extra headers sent on every request.
    pub headers: HashMap<String, String>,
    /// A caller-supplied `reqwest::Client` to clone rather than build a
    /// fresh one. Useful for sharing a connection pool or proxy config.
    pub http_client: Option<reqwest::Client>,
}

impl HttpTransportConfig {
    /// Start a config pointed at `base_url` with no authentication.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            bearer_token: None,
            token_provider: None,
            headers: HashMap::new(),
            http_client: None,
        }
    }

    /// Attach a static bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Attach an async token provider, taking precedence over any static token.
    #[must_use]
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Add a static header sent on every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Use a caller-supplied client instead of building one internally.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }
}
