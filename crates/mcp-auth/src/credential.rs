//! The stored-credential record and its expiry predicates.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AuthError, Result};

/// Lead time before `expiresAt` at which a credential is considered due for
/// refresh, so a caller using the token has a margin before the server
/// actually rejects it.
const REFRESH_LEAD_MS: i64 = 30_000;

/// An OAuth credential for one MCP server.
///
/// Constructed only through [`Credential::new`], which enforces the
/// non-empty/positive-expiry invariants the store re-checks on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Human-readable server name, if known.
    #[serde(rename = "serverName", skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// The MCP server's URL; the store's lookup key.
    #[serde(rename = "serverURL")]
    pub server_url: String,
    /// The OAuth client ID used to obtain this credential.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// The OAuth client secret, for confidential clients.
    #[serde(rename = "clientSecret", skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// The current bearer access token.
    #[serde(rename = "accessToken")]
    pub access_token: String,
    /// The refresh token, if the server issued one.
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry, unix milliseconds.
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    /// Scopes granted to this credential.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Build a credential, rejecting empty required fields or a non-positive
    /// expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] if `server_url`, `client_id`,
    /// or `access_token` is empty, or if `expires_at <= 0`.
    pub fn new(
        server_name: Option<String>,
        server_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: i64,
        scopes: Vec<String>,
    ) -> Result<Self> {
        let credential = Self {
            server_name,
            server_url: server_url.into(),
            client_id: client_id.into(),
            client_secret,
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            scopes,
        };
        credential.validate()?;
        Ok(credential)
    }

    /// Re-check this credential's invariants; used by the store before every
    /// write, since a credential may be mutated in place (e.g. after a
    /// refresh) rather than rebuilt through [`Credential::new`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] if any required field is
    /// empty or `expires_at` is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(AuthError::InvalidCredential("serverURL must not be empty".into()));
        }
        if self.client_id.is_empty() {
            return Err(AuthError::InvalidCredential("clientID must not be empty".into()));
        }
        if self.access_token.is_empty() {
            return Err(AuthError::InvalidCredential("accessToken must not be empty".into()));
        }
        if self.expires_at <= 0 {
            return Err(AuthError::InvalidCredential("expiresAt must be positive".into()));
        }
        Ok(())
    }

    /// True once `now >= expiresAt`.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_unix_ms() >= self.expires_at
    }

    /// True once `now >= expiresAt - 30s`, the point at which a caller
    /// should proactively refresh rather than wait for an outright failure.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        now_unix_ms() >= self.expires_at - REFRESH_LEAD_MS
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Credential {
        Credential::new(
            Some("fake".into()),
            "https://mcp.example.com",
            "client-1",
            None,
            "access-token",
            Some("refresh-token".into()),
            now_unix_ms() + 3_600_000,
            vec!["mcp:tools".into()],
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_server_url() {
        let err = Credential::new(
            None,
            "",
            "client-1",
            None,
            "token",
            None,
            now_unix_ms() + 1000,
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[test]
    fn rejects_non_positive_expiry() {
        let err = Credential::new(
            None,
            "https://mcp.example.com",
            "client-1",
            None,
            "token",
            None,
            0,
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }

    #[test]
    fn fresh_credential_does_not_need_refresh() {
        let credential = valid();
        assert!(!credential.is_expired());
        assert!(!credential.needs_refresh());
    }

    #[test]
    fn needs_refresh_inside_lead_window() {
        let mut credential = valid();
        credential.expires_at = now_unix_ms() + 10_000;
        assert!(!credential.is_expired());
        assert!(credential.needs_refresh());
    }

    #[test]
    fn expired_past_deadline() {
        let mut credential = valid();
        credential.expires_at = now_unix_ms() - 1;
        assert!(credential.is_expired());
        assert!(credential.needs_refresh());
    }
}
