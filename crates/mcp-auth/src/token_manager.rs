//! Access-token lifecycle management (C10): refresh gating, a per-server
//! metadata cache, and non-destructive failure on a failed refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use url::Url;

use crate::credential::Credential;
use crate::discovery::{AuthorizationServerMetadata, DiscoveryClient};
use crate::error::{AuthError, Result};
use crate::store::CredentialStore;

const TOKEN_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Issues valid access tokens for a server, refreshing through the store
/// when the cached credential is due and failing closed (never mutating the
/// stored credential) when a refresh attempt fails.
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    discovery: DiscoveryClient,
    http: reqwest::Client,
    metadata_cache: DashMap<String, AuthorizationServerMetadata>,
    protocol_version: String,
}

impl TokenManager {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, protocol_version: impl Into<String>) -> Self {
        Self {
            store,
            discovery: DiscoveryClient::new(),
            http: reqwest::Client::builder()
                .timeout(TOKEN_ENDPOINT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            metadata_cache: DashMap::new(),
            protocol_version: protocol_version.into(),
        }
    }

    /// Return a valid access token for `server_url`, refreshing first if the
    /// stored credential is due.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] if no credential is stored,
    /// [`AuthError::NoRefreshToken`] if a refresh is due but no refresh token
    /// is on file, or a discovery/token-exchange error if the refresh call
    /// itself fails. On any refresh failure the stored credential is left
    /// untouched.
    pub async fn get(&self, server_url: &str) -> Result<String> {
        let credential = self
            .store
            .get(server_url)
            .await?
            .ok_or_else(|| AuthError::InvalidCredential(format!("no credential stored for {server_url}")))?;

        if !credential.needs_refresh() {
            return Ok(credential.access_token);
        }

        let refreshed = self.refresh(&credential).await?;
        let access_token = refreshed.access_token.clone();

        if let Err(e) = self.store.put(&refreshed).await {
            tracing::warn!(error = %e, server_url, "failed to persist refreshed credential");
        }

        Ok(access_token)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        let metadata = self.metadata_for(&credential.server_url).await?;

        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token".to_string());
        form.insert("client_id", credential.client_id.clone());
        form.insert("refresh_token", refresh_token);

        let response = self
            .http
            .post(&metadata.token_endpoint)
            .header("Accept", "application/json")
            .header("MCP-Protocol-Version", &self.protocol_version)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailed(format!("HTTP {status}: {body}")));
        }

        #[derive(serde::Deserialize)]
        struct RefreshResponse {
            access_token: String,
            #[serde(default)]
            refresh_token: Option<String>,
            #[serde(default)]
            expires_in: Option<i64>,
            #[serde(default)]
            scope: Option<String>,
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("malformed refresh response: {e}")))?;

        if parsed.access_token.is_empty() {
            return Err(AuthError::MissingAccessToken);
        }

        let mut updated = credential.clone();
        updated.access_token = parsed.access_token;
        if let Some(refresh_token) = parsed.refresh_token {
            updated.refresh_token = Some(refresh_token);
        }
        updated.expires_at = now_unix_ms() + parsed.expires_in.unwrap_or(3600) * 1000;
        if let Some(scope) = parsed.scope {
            updated.scopes = scope.split_whitespace().map(String::from).collect();
        }
        updated.validate()?;
        Ok(updated)
    }

    async fn metadata_for(&self, server_url: &str) -> Result<AuthorizationServerMetadata> {
        if let Some(cached) = self.metadata_cache.get(server_url) {
            return Ok(cached.clone());
        }
        let url = Url::parse(server_url)
            .map_err(|e| AuthError::DiscoveryFailed(format!("invalid server URL: {e}")))?;
        let metadata = self.discovery.discover_direct(&url, &self.protocol_version).await?;
        self.metadata_cache.insert(server_url.to_string(), metadata.clone());
        Ok(metadata)
    }
}

fn now_unix_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
