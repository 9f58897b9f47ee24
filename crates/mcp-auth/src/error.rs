//! Error taxonomy for credential validation, discovery, and the OAuth flow.

use thiserror::Error;

/// Result alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors surfaced by discovery, the OAuth flow, the token manager, and the
/// credential store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    /// A [`crate::Credential`] failed its construction/write invariants.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// No well-known discovery document was found by any candidate URL.
    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    /// A discovery document was fetched but is missing required fields.
    #[error("malformed discovery document: {0}")]
    MalformedMetadata(String),

    /// Dynamic client registration (RFC 7591) was rejected by the server.
    #[error("client registration failed: {0}")]
    RegistrationFailed(String),

    /// The authorization server reported an error on the callback.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The callback's `state` parameter did not match the one sent in the
    /// authorization request (possible CSRF).
    #[error("state mismatch: possible CSRF")]
    StateMismatch,

    /// No callback arrived within the allotted window.
    #[error("timed out waiting for the OAuth callback")]
    CallbackTimeout,

    /// The token endpoint rejected the authorization-code or refresh
    /// exchange.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The token endpoint returned 2xx but the body lacked `access_token`.
    #[error("token response missing access_token")]
    MissingAccessToken,

    /// A stored credential has no refresh token, so it cannot be refreshed.
    #[error("credential has no refresh token")]
    NoRefreshToken,

    /// Underlying HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(String),

    /// Failure reading/writing the credential store's backing file.
    #[error("credential store I/O error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}
