//! The end-to-end OAuth 2.1 authorization-code-plus-PKCE flow (C9).

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use url::Url;

use mcp_transport_traits::Challenge;

use crate::callback::CallbackServer;
use crate::credential::Credential;
use crate::dcr::{DcrClient, RegistrationRequest};
use crate::discovery::{AuthorizationServerMetadata, DiscoveryClient};
use crate::error::{AuthError, Result};
use crate::pkce::{generate_state, PkcePair};

const TOKEN_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Built-in public client identifier used when the server has no
/// `registration_endpoint`.
pub const BUILTIN_CLIENT_ID: &str = "mcp-client";

/// Caller-supplied parameters for a single authorization run.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// The MCP server's base URL, used for discovery.
    pub server_url: Url,
    /// Human-readable client name sent during dynamic registration.
    pub client_name: String,
    /// Requested scopes, space-joined on the wire.
    pub scopes: Vec<String>,
    /// Port to bind the loopback callback server on; `0` picks a random port.
    pub requested_port: u16,
    /// The negotiated MCP protocol version, sent as `MCP-Protocol-Version`.
    pub protocol_version: String,
}

/// Opens a URL with the platform's default browser launcher. Best-effort:
/// failures are left to the caller to report, since the flow itself only
/// needs the callback to eventually arrive.
///
/// # Errors
///
/// Returns [`AuthError::Http`] if no launcher could be spawned.
pub fn open_in_browser(url: &str) -> Result<()> {
    let result = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()
    } else {
        std::process::Command::new("xdg-open").arg(url).status()
    };

    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(AuthError::Http(format!("browser launcher exited with {status}"))),
        Err(e) => Err(AuthError::Http(format!("failed to launch browser: {e}"))),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Orchestrates discovery, optional registration, the browser round-trip,
/// and the code-for-token exchange, returning a validated [`Credential`].
pub struct OAuthFlow {
    http: reqwest::Client,
    discovery: DiscoveryClient,
    dcr: DcrClient,
}

impl Default for OAuthFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthFlow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(TOKEN_ENDPOINT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            discovery: DiscoveryClient::new(),
            dcr: DcrClient::new(),
        }
    }

    /// Run the full flow, discovering the authorization server directly from
    /// `config.server_url`'s well-known endpoints. `launch_browser` is called
    /// with the authorization URL instead of [`open_in_browser`] directly, so
    /// tests can intercept it.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] variant for each named failure mode:
    /// discovery failure, registration failure, a denied or mismatched
    /// callback, a callback timeout, or a failed token exchange.
    pub async fn run(
        &self,
        config: &FlowConfig,
        launch_browser: impl FnOnce(&str) -> Result<()>,
    ) -> Result<Credential> {
        let metadata = self.discovery.discover_direct(&config.server_url, &config.protocol_version).await?;
        self.run_with_metadata(metadata, config, launch_browser).await
    }

    /// Run the full flow, discovering the authorization server via RFC 9728
    /// challenge-driven discovery instead of `config.server_url`'s well-known
    /// endpoints: the server's `401 Unauthorized` response carries a
    /// `WWW-Authenticate` challenge whose `resource_metadata` URL points at
    /// the protected-resource metadata document, which in turn lists the
    /// authorization servers to discover against.
    ///
    /// This is the entry point a caller reaches for after a transport surfaces
    /// a `TransportError::Unauthorized { challenges }` — pass the challenge
    /// that carries a `resource_metadata` parameter (use
    /// [`mcp_transport_traits::find_bearer`] to locate the Bearer one).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MalformedMetadata`] if `challenge` carries no
    /// `resource_metadata`, and otherwise the same failure modes as [`Self::run`].
    pub async fn run_from_challenge(
        &self,
        challenge: &Challenge,
        config: &FlowConfig,
        launch_browser: impl FnOnce(&str) -> Result<()>,
    ) -> Result<Credential> {
        let metadata = self
            .discovery
            .discover_from_challenge(challenge, &config.protocol_version)
            .await?;
        self.run_with_metadata(metadata, config, launch_browser).await
    }

    async fn run_with_metadata(
        &self,
        metadata: AuthorizationServerMetadata,
        config: &FlowConfig,
        launch_browser: impl FnOnce(&str) -> Result<()>,
    ) -> Result<Credential> {
        let callback_server = CallbackServer::bind(config.requested_port).await?;
        let redirect_uri = callback_server.redirect_uri();

        let client_id = match &metadata.registration_endpoint {
            Some(registration_endpoint) => {
                let request = RegistrationRequest::public_client(redirect_uri.clone(), config.client_name.clone());
                self.dcr.register(registration_endpoint, &request).await?.client_id
            }
            None => BUILTIN_CLIENT_ID.to_string(),
        };

        let pkce = PkcePair::generate();
        let state = generate_state();
        let authorization_url = build_authorization_url(&metadata, &client_id, &redirect_uri, &pkce, &state, &config.scopes)?;

        launch_browser(authorization_url.as_str())?;

        let callback = callback_server.wait().await?;
        if let Some(error) = callback.error {
            return Err(AuthError::AuthorizationDenied(error));
        }
        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        let code = callback.code.ok_or_else(|| {
            AuthError::AuthorizationDenied("callback carried no authorization code".into())
        })?;

        let token_response = self
            .exchange_code(&metadata, &client_id, &redirect_uri, &code, &pkce.verifier, &config.protocol_version)
            .await?;

        let expires_at = now_unix_ms() + token_response.expires_in.unwrap_or(3600) * 1000;
        let scopes = token_response
            .scope
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_else(|| config.scopes.clone());

        Credential::new(
            None,
            config.server_url.to_string(),
            client_id,
            None,
            token_response.access_token,
            token_response.refresh_token,
            expires_at,
            scopes,
        )
    }

    async fn exchange_code(
        &self,
        metadata: &AuthorizationServerMetadata,
        client_id: &str,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
        protocol_version: &str,
    ) -> Result<TokenResponse> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", redirect_uri);
        form.insert("client_id", client_id);
        form.insert("code_verifier", code_verifier);

        let response = self
            .http
            .post(&metadata.token_endpoint)
            .header("Accept", "application/json")
            .header("MCP-Protocol-Version", protocol_version)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailed(format!("HTTP {status}: {body}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("malformed token response: {e}")))?;

        if token_response.access_token.is_empty() {
            return Err(AuthError::MissingAccessToken);
        }
        Ok(token_response)
    }
}

fn build_authorization_url(
    metadata: &AuthorizationServerMetadata,
    client_id: &str,
    redirect_uri: &str,
    pkce: &PkcePair,
    state: &str,
    scopes: &[String],
) -> Result<Url> {
    let mut url = Url::parse(&metadata.authorization_endpoint)
        .map_err(|e| AuthError::DiscoveryFailed(format!("invalid authorization_endpoint: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");
        if !scopes.is_empty() {
            query.append_pair("scope", &scopes.join(" "));
        }
    }
    Ok(url)
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Selects the client-authentication method a confidential client should use
/// against the token endpoint, per the server's advertised support.
#[must_use]
pub fn select_client_auth_method(metadata: &AuthorizationServerMetadata) -> &'static str {
    let supported = metadata.token_endpoint_auth_methods_supported.as_deref().unwrap_or(&[]);
    if supported.iter().any(|m| m == "client_secret_post") {
        "client_secret_post"
    } else {
        "client_secret_basic"
    }
}
