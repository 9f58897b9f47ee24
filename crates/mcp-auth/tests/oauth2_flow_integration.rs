//! End-to-end OAuth 2.1 authorization-code-plus-PKCE flow against a mock
//! authorization server: discovery, dynamic client registration, the
//! loopback callback round-trip, and the final code-for-token exchange.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_auth::{AuthError, FlowConfig, OAuthFlow};

async fn mount_discovery(server: &MockServer, registration_endpoint: Option<String>) {
    let mut body = json!({
        "issuer": server.uri(),
        "authorization_endpoint": format!("{}/authorize", server.uri()),
        "token_endpoint": format!("{}/token", server.uri()),
        "code_challenge_methods_supported": ["S256"],
    });
    if let Some(endpoint) = registration_endpoint {
        body["registration_endpoint"] = json!(endpoint);
    }

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn config(server: &MockServer) -> FlowConfig {
    FlowConfig {
        server_url: url::Url::parse(&server.uri()).unwrap(),
        client_name: "mcp-client-test".into(),
        scopes: vec!["mcp:tools".into()],
        requested_port: 0,
        protocol_version: "2025-06-18".into(),
    }
}

#[tokio::test]
async fn full_flow_with_dynamic_registration_succeeds() {
    let server = MockServer::start().await;
    mount_discovery(&server, Some(format!("{}/register", server.uri()))).await;

    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "client_id": "dynamic-client-1",
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-123",
            "refresh_token": "rt-123",
            "expires_in": 3600,
            "scope": "mcp:tools",
        })))
        .mount(&server)
        .await;

    let flow = OAuthFlow::new();
    let credential = flow
        .run(&config(&server), |authorization_url| {
            // Stand in for the browser: hit the callback URL directly with
            // the `state` the flow embedded in the authorization request.
            let url = url::Url::parse(authorization_url).unwrap();
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let redirect_uri = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();

            tokio::spawn(async move {
                reqwest::Client::new()
                    .get(format!("{redirect_uri}?code=auth-code-1&state={state}"))
                    .send()
                    .await
                    .unwrap();
            });
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(credential.client_id, "dynamic-client-1");
    assert_eq!(credential.access_token, "at-123");
    assert_eq!(credential.refresh_token.as_deref(), Some("rt-123"));
    assert_eq!(credential.scopes, vec!["mcp:tools".to_string()]);
}

#[tokio::test]
async fn full_flow_without_registration_endpoint_uses_builtin_client() {
    let server = MockServer::start().await;
    mount_discovery(&server, None).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-456",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let flow = OAuthFlow::new();
    let credential = flow
        .run(&config(&server), |authorization_url| {
            let url = url::Url::parse(authorization_url).unwrap();
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let redirect_uri = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            tokio::spawn(async move {
                reqwest::Client::new()
                    .get(format!("{redirect_uri}?code=auth-code-2&state={state}"))
                    .send()
                    .await
                    .unwrap();
            });
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(credential.client_id, mcp_auth::BUILTIN_CLIENT_ID);
    assert_eq!(credential.access_token, "at-456");
}

#[tokio::test]
async fn state_mismatch_on_callback_is_rejected() {
    let server = MockServer::start().await;
    mount_discovery(&server, None).await;

    let flow = OAuthFlow::new();
    let err = flow
        .run(&config(&server), |authorization_url| {
            let url = url::Url::parse(authorization_url).unwrap();
            let redirect_uri = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            tokio::spawn(async move {
                reqwest::Client::new()
                    .get(format!("{redirect_uri}?code=auth-code-3&state=wrong-state"))
                    .send()
                    .await
                    .unwrap();
            });
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::StateMismatch));
}

#[tokio::test]
async fn authorization_denied_by_server_is_rejected() {
    let server = MockServer::start().await;
    mount_discovery(&server, None).await;

    let flow = OAuthFlow::new();
    let err = flow
        .run(&config(&server), |authorization_url| {
            let url = url::Url::parse(authorization_url).unwrap();
            let redirect_uri = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            tokio::spawn(async move {
                reqwest::Client::new()
                    .get(format!("{redirect_uri}?error=access_denied&error_description=user+declined"))
                    .send()
                    .await
                    .unwrap();
            });
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::AuthorizationDenied(_)));
}

/// Testable scenario: challenge-driven (RFC 9728) discovery. The flow never
/// talks to the server's own well-known endpoints; it follows the challenge's
/// `resource_metadata` URL to the protected-resource document, then
/// discovers against the authorization server that document lists.
#[tokio::test]
async fn run_from_challenge_discovers_via_protected_resource_metadata() {
    let resource_server = MockServer::start().await;
    let auth_server = MockServer::start().await;
    mount_discovery(&auth_server, None).await;

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-protected-resource"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource": resource_server.uri(),
            "authorization_servers": [auth_server.uri()],
        })))
        .mount(&resource_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-challenge-1",
            "expires_in": 3600,
        })))
        .mount(&auth_server)
        .await;

    let header = format!(
        r#"Bearer resource_metadata="{}/.well-known/oauth-protected-resource""#,
        resource_server.uri()
    );
    let challenges = mcp_transport_traits::parse_www_authenticate(&header).unwrap();
    let bearer = mcp_transport_traits::find_bearer(&challenges).unwrap();

    let flow = OAuthFlow::new();
    let credential = flow
        .run_from_challenge(bearer, &config(&resource_server), |authorization_url| {
            let url = url::Url::parse(authorization_url).unwrap();
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let redirect_uri = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            tokio::spawn(async move {
                reqwest::Client::new()
                    .get(format!("{redirect_uri}?code=auth-code-challenge&state={state}"))
                    .send()
                    .await
                    .unwrap();
            });
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(credential.access_token, "at-challenge-1");
    assert_eq!(credential.client_id, mcp_auth::BUILTIN_CLIENT_ID);
}

#[tokio::test]
async fn token_exchange_failure_surfaces_as_distinct_error() {
    let server = MockServer::start().await;
    mount_discovery(&server, None).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
        })))
        .mount(&server)
        .await;

    let flow = OAuthFlow::new();
    let err = flow
        .run(&config(&server), |authorization_url| {
            let url = url::Url::parse(authorization_url).unwrap();
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let redirect_uri = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            tokio::spawn(async move {
                reqwest::Client::new()
                    .get(format!("{redirect_uri}?code=auth-code-4&state={state}"))
                    .send()
                    .await
                    .unwrap();
            });
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::TokenExchangeFailed(_)));
}
