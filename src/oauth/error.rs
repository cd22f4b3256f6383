use super::provider::Integration;
use crate::store::StoreError;
use thiserror::Error;

/// Failures of the authorization-code flow and the credential handoff.
///
/// None of these are retried internally. State and callback errors mean the
/// redirect must be restarted, credential errors mean the user has to
/// re-authorize, and exchange errors carry the provider's own status and body.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid state format.")]
    InvalidStateFormat,

    #[error("Invalid state data: missing token, user_id or org_id.")]
    MissingStateFields,

    #[error("State does not match.")]
    StateMismatch,

    #[error("Unsupported integration: {0}")]
    UnsupportedIntegration(String),

    #[error("OAuth not configured for integration '{0}'")]
    NotConfigured(Integration),

    #[error("Authorization denied by provider: {error}{}", suffix(.description))]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Missing code or state")]
    MissingCallbackParams,

    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("No credentials found.")]
    CredentialsNotFound,

    #[error("Invalid credentials format.")]
    InvalidCredentialsFormat,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn suffix(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" - {}", d))
        .unwrap_or_default()
}

impl OAuthError {
    /// Whether the fix is to start a fresh `authorize()` round-trip.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            OAuthError::InvalidStateFormat
                | OAuthError::MissingStateFields
                | OAuthError::StateMismatch
                | OAuthError::ProviderDenied { .. }
                | OAuthError::TokenExchangeFailed { .. }
                | OAuthError::CredentialsNotFound
                | OAuthError::InvalidCredentialsFormat
        )
    }
}
