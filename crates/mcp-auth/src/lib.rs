//! OAuth 2.1 discovery, PKCE authorization-code flow, token lifecycle, and
//! credential storage for MCP clients.

mod callback;
mod credential;
mod dcr;
mod discovery;
mod error;
mod flow;
mod pkce;
mod store;
mod token_manager;

pub use callback::{CallbackResult, CallbackServer};
pub use credential::Credential;
pub use dcr::{DcrClient, RegistrationRequest, RegistrationResponse};
pub use discovery::{AuthorizationServerMetadata, DiscoveryClient, ProtectedResourceMetadata};
pub use error::{AuthError, Result};
pub use flow::{open_in_browser, select_client_auth_method, FlowConfig, OAuthFlow, BUILTIN_CLIENT_ID};
pub use pkce::{challenge_for, generate_state, PkcePair};
pub use store::{CredentialStore, FileCredentialStore};
pub use token_manager::TokenManager;
