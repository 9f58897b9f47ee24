//! OAuth authorization-server discovery: direct well-known probing (RFC 8414)
//! and challenge-driven discovery via protected-resource metadata (RFC 9728).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use mcp_transport_traits::Challenge;

use crate::error::{AuthError, Result};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DISCOVERY_RESPONSE: usize = 1024 * 1024;

/// OAuth 2.0 Authorization Server Metadata (RFC 8414 subset): only the
/// fields the authorization-code flow actually consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// The authorization server's issuer identifier.
    pub issuer: String,
    /// URL of the authorization endpoint.
    pub authorization_endpoint: String,
    /// URL of the token endpoint.
    pub token_endpoint: String,
    /// URL of the dynamic client registration endpoint (RFC 7591).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// URL of the token revocation endpoint (RFC 7009).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// Scopes this server supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// PKCE code-challenge methods this server supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    /// Grant types this server supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,
    /// Response types this server supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,
    /// Client authentication methods the token endpoint accepts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
}

/// Intermediate shape for deserializing a metadata document before the
/// non-empty-endpoint invariant is checked; the wire document may omit
/// either endpoint, in which case discovery rejects the document rather
/// than producing an [`AuthorizationServerMetadata`] with empty strings.
#[derive(Debug, Deserialize)]
struct RawAuthorizationServerMetadata {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    registration_endpoint: Option<String>,
    revocation_endpoint: Option<String>,
    scopes_supported: Option<Vec<String>>,
    code_challenge_methods_supported: Option<Vec<String>>,
    grant_types_supported: Option<Vec<String>>,
    response_types_supported: Option<Vec<String>>,
    token_endpoint_auth_methods_supported: Option<Vec<String>>,
}

impl RawAuthorizationServerMetadata {
    fn validated(self) -> Result<AuthorizationServerMetadata> {
        let authorization_endpoint = self.authorization_endpoint.filter(|s| !s.is_empty());
        let token_endpoint = self.token_endpoint.filter(|s| !s.is_empty());
        match (authorization_endpoint, token_endpoint) {
            (Some(authorization_endpoint), Some(token_endpoint)) => Ok(AuthorizationServerMetadata {
                issuer: self.issuer.unwrap_or_default(),
                authorization_endpoint,
                token_endpoint,
                registration_endpoint: self.registration_endpoint,
                revocation_endpoint: self.revocation_endpoint,
                scopes_supported: self.scopes_supported,
                code_challenge_methods_supported: self.code_challenge_methods_supported,
                grant_types_supported: self.grant_types_supported,
                response_types_supported: self.response_types_supported,
                token_endpoint_auth_methods_supported: self.token_endpoint_auth_methods_supported,
            }),
            _ => Err(AuthError::MalformedMetadata(
                "authorization_endpoint and token_endpoint must both be non-empty".into(),
            )),
        }
    }
}

impl AuthorizationServerMetadata {
    /// True iff this server advertises S256 PKCE support.
    #[must_use]
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// RFC 9728 Protected Resource Metadata: points a client at the
/// authorization servers that protect a resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The protected resource's canonical URI.
    pub resource: String,
    /// Authorization servers that can issue tokens for this resource.
    pub authorization_servers: Vec<String>,
    /// Scopes the resource recognizes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// Bearer token delivery methods the resource accepts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,
}

/// Fetches and validates OAuth discovery documents.
pub struct DiscoveryClient {
    http: reqwest::Client,
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryClient {
    /// Build a discovery client with the spec's 5-second timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DISCOVERY_TIMEOUT)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_default(),
        }
    }

    /// Direct well-known probing: try each of the three candidate URLs in
    /// order, returning the first document that parses and validates.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DiscoveryFailed`] if no candidate yields a valid
    /// document.
    pub async fn discover_direct(
        &self,
        server_url: &Url,
        protocol_version: &str,
    ) -> Result<AuthorizationServerMetadata> {
        let mut last_error = String::new();
        for candidate in candidate_well_known_urls(server_url) {
            match self.fetch_metadata(&candidate, protocol_version).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(AuthError::DiscoveryFailed(format!(
            "no well-known discovery URL succeeded for {server_url}: {last_error}"
        )))
    }

    /// Challenge-driven (RFC 9728) discovery: fetch the challenge's
    /// `resource_metadata` URL, then run direct discovery against each
    /// listed authorization server until one succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DiscoveryFailed`] if the resource-metadata
    /// document has no usable `authorization_servers` entry, or
    /// [`AuthError::MalformedMetadata`] if the challenge lacks
    /// `resource_metadata`.
    pub async fn discover_from_challenge(
        &self,
        challenge: &Challenge,
        protocol_version: &str,
    ) -> Result<AuthorizationServerMetadata> {
        let resource_metadata_url = challenge.resource_metadata().ok_or_else(|| {
            AuthError::MalformedMetadata("challenge carries no resource_metadata".into())
        })?;

        let resource_metadata = self
            .fetch_protected_resource(resource_metadata_url, protocol_version)
            .await?;

        let mut last_error = String::new();
        for authorization_server in &resource_metadata.authorization_servers {
            let Ok(url) = Url::parse(authorization_server) else {
                last_error = format!("invalid authorization server URL: {authorization_server}");
                continue;
            };
            match self.discover_direct(&url, protocol_version).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(AuthError::DiscoveryFailed(format!(
            "no authorization server in protected-resource metadata succeeded: {last_error}"
        )))
    }

    async fn fetch_metadata(
        &self,
        url: &str,
        protocol_version: &str,
    ) -> Result<AuthorizationServerMetadata> {
        let body = self.get_bounded(url, protocol_version).await?;
        let raw: RawAuthorizationServerMetadata = serde_json::from_slice(&body)
            .map_err(|e| AuthError::MalformedMetadata(e.to_string()))?;
        raw.validated()
    }

    async fn fetch_protected_resource(
        &self,
        url: &str,
        protocol_version: &str,
    ) -> Result<ProtectedResourceMetadata> {
        let body = self.get_bounded(url, protocol_version).await?;
        let metadata: ProtectedResourceMetadata =
            serde_json::from_slice(&body).map_err(|e| AuthError::MalformedMetadata(e.to_string()))?;
        if metadata.authorization_servers.is_empty() {
            return Err(AuthError::MalformedMetadata(
                "protected resource metadata lists no authorization_servers".into(),
            ));
        }
        Ok(metadata)
    }

    async fn get_bounded(&self, url: &str, protocol_version: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("MCP-Protocol-Version", protocol_version)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::DiscoveryFailed(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_DISCOVERY_RESPONSE {
                return Err(AuthError::DiscoveryFailed(format!(
                    "{url} response exceeds {MAX_DISCOVERY_RESPONSE} bytes"
                )));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_DISCOVERY_RESPONSE {
            return Err(AuthError::DiscoveryFailed(format!(
                "{url} response exceeds {MAX_DISCOVERY_RESPONSE} bytes"
            )));
        }
        Ok(bytes.to_vec())
    }
}

fn candidate_well_known_urls(server_url: &Url) -> Vec<String> {
    let scheme = server_url.scheme();
    let host = server_url.host_str().unwrap_or_default();
    let port_suffix = server_url
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    let origin = format!("{scheme}://{host}{port_suffix}");
    let path = server_url.path();

    let mut candidates = Vec::with_capacity(3);
    if !path.is_empty() && path != "/" {
        let trimmed = path.trim_start_matches('/');
        candidates.push(format!("{origin}/.well-known/oauth-authorization-server/{trimmed}"));
        candidates.push(format!("{origin}{path}/.well-known/oauth-authorization-server"));
    }
    candidates.push(format!("{origin}/.well-known/oauth-authorization-server"));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_for_bare_origin_has_one_entry() {
        let url = Url::parse("https://mcp.example.com").unwrap();
        let candidates = candidate_well_known_urls(&url);
        assert_eq!(
            candidates,
            vec!["https://mcp.example.com/.well-known/oauth-authorization-server"]
        );
    }

    #[test]
    fn candidates_for_path_has_three_entries_in_order() {
        let url = Url::parse("https://mcp.example.com/tenant1").unwrap();
        let candidates = candidate_well_known_urls(&url);
        assert_eq!(
            candidates,
            vec![
                "https://mcp.example.com/.well-known/oauth-authorization-server/tenant1",
                "https://mcp.example.com/tenant1/.well-known/oauth-authorization-server",
                "https://mcp.example.com/.well-known/oauth-authorization-server",
            ]
        );
    }

    #[test]
    fn raw_metadata_missing_token_endpoint_is_rejected() {
        let raw = RawAuthorizationServerMetadata {
            issuer: Some("https://as.example.com".into()),
            authorization_endpoint: Some("https://as.example.com/authorize".into()),
            token_endpoint: None,
            registration_endpoint: None,
            revocation_endpoint: None,
            scopes_supported: None,
            code_challenge_methods_supported: None,
            grant_types_supported: None,
            response_types_supported: None,
            token_endpoint_auth_methods_supported: None,
        };
        assert!(matches!(raw.validated(), Err(AuthError::MalformedMetadata(_))));
    }

    #[test]
    fn supports_s256_checks_challenge_methods() {
        let metadata = AuthorizationServerMetadata {
            issuer: "https://as.example.com".into(),
            authorization_endpoint: "https://as.example.com/authorize".into(),
            token_endpoint: "https://as.example.com/token".into(),
            registration_endpoint: None,
            revocation_endpoint: None,
            scopes_supported: None,
            code_challenge_methods_supported: Some(vec!["S256".into()]),
            grant_types_supported: None,
            response_types_supported: None,
            token_endpoint_auth_methods_supported: None,
        };
        assert!(metadata.supports_s256());
    }
}
