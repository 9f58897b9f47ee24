//! Dynamic client registration (RFC 7591).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AuthError, Result};

/// A client-registration request, built for the public-client,
/// authorization-code-plus-PKCE shape the flow always uses.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub redirect_uris: Vec<String>,
    pub client_name: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
}

impl RegistrationRequest {
    /// Build the request this flow always sends: a public client (no secret,
    /// `token_endpoint_auth_method: "none"`) requesting the authorization-code
    /// and refresh-token grants.
    #[must_use]
    pub fn public_client(redirect_uri: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            redirect_uris: vec![redirect_uri.into()],
            client_name: client_name.into(),
            grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            response_types: vec!["code".into()],
            token_endpoint_auth_method: "none".into(),
        }
    }
}

/// A client-registration response (RFC 7591 §3.2 subset).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Registers a client with an authorization server's `registration_endpoint`.
pub struct DcrClient {
    http: reqwest::Client,
}

impl Default for DcrClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DcrClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// POST `request` to `registration_endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RegistrationFailed`] if the server responds with
    /// anything other than 200/201, or if the response body lacks
    /// `client_id`.
    pub async fn register(
        &self,
        registration_endpoint: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse> {
        let response = self
            .http
            .post(registration_endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 && status.as_u16() != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RegistrationFailed(format!(
                "registration endpoint returned HTTP {status}: {body}"
            )));
        }

        response
            .json::<RegistrationResponse>()
            .await
            .map_err(|e| AuthError::RegistrationFailed(format!("malformed registration response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_client_request_has_no_auth_method() {
        let request = RegistrationRequest::public_client("http://127.0.0.1:8733/callback", "mcp-client");
        assert_eq!(request.token_endpoint_auth_method, "none");
        assert_eq!(request.grant_types, vec!["authorization_code", "refresh_token"]);
        assert_eq!(request.redirect_uris, vec!["http://127.0.0.1:8733/callback"]);
    }

    #[tokio::test]
    async fn register_rejects_non_2xx_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_client_metadata"
            })))
            .mount(&server)
            .await;

        let client = DcrClient::new();
        let request = RegistrationRequest::public_client("http://127.0.0.1:8733/callback", "mcp-client");
        let err = client
            .register(&format!("{}/register", server.uri()), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RegistrationFailed(_)));
    }

    #[tokio::test]
    async fn register_returns_client_id_on_success() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "client_id": "abc123"
            })))
            .mount(&server)
            .await;

        let client = DcrClient::new();
        let request = RegistrationRequest::public_client("http://127.0.0.1:8733/callback", "mcp-client");
        let response = client
            .register(&format!("{}/register", server.uri()), &request)
            .await
            .unwrap();
        assert_eq!(response.client_id, "abc123");
        assert!(response.client_secret.is_none());
    }
}
