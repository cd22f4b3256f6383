//! OAuth 2.0 authorization-code flow for third-party integrations.
//!
//! Implements the flow end to end:
//! 1. Frontend asks for an authorization URL for (user, org)
//! 2. A CSRF state (and a PKCE verifier for Airtable) is stored with a TTL
//! 3. User authorizes on the provider's site
//! 4. Provider redirects to the callback with `code` and `state`
//! 5. State is checked and consumed, code is exchanged for a token payload
//! 6. Payload is parked under a single-use key until the frontend reads it

mod credentials;
mod error;
mod exchange;
mod flow;
pub mod pkce;
pub mod provider;
mod state;

pub use credentials::CredentialCache;
pub use error::OAuthError;
pub use exchange::TokenExchangeClient;
pub use flow::{CallbackParams, OAuthFlow};
pub use pkce::PkcePair;
pub use provider::{Integration, ProviderConfig, ProviderRegistry};
pub use state::{PendingAuthorization, StateIdentity, StateManager, ValidatedState};

/// Token endpoint response, kept verbatim.
pub type CredentialPayload = serde_json::Map<String, serde_json::Value>;

/// Store key for one record kind of a flow: `{integration}_{kind}:{org_id}:{user_id}`.
pub(crate) fn cache_key(integration: Integration, kind: &str, org_id: &str, user_id: &str) -> String {
    format!("{}_{}:{}:{}", integration, kind, org_id, user_id)
}
