//! The three upward entry points: authorize, handle_callback, get_credentials.

use super::credentials::CredentialCache;
use super::exchange::TokenExchangeClient;
use super::provider::{Integration, ProviderRegistry};
use super::state::{StateIdentity, StateManager};
use super::{CredentialPayload, OAuthError};
use crate::config::OAuthSettings;
use crate::store::KeyValueStore;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// OAuth callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Orchestrates state, exchange and credential handoff over one shared store.
#[derive(Clone)]
pub struct OAuthFlow {
    providers: Arc<ProviderRegistry>,
    states: StateManager,
    exchange: TokenExchangeClient,
    credentials: CredentialCache,
}

impl OAuthFlow {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        providers: Arc<ProviderRegistry>,
        http_client: reqwest::Client,
        settings: &OAuthSettings,
    ) -> Self {
        Self {
            states: StateManager::new(store.clone(), settings.state_token_expiration_seconds),
            exchange: TokenExchangeClient::new(providers.clone(), http_client),
            credentials: CredentialCache::new(store, settings.credential_ttl_seconds),
            providers,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Start a flow and return the provider URL to send the browser to.
    ///
    /// Fails before touching the store when the integration is unknown or has
    /// no client credentials.
    pub async fn authorize(
        &self,
        integration: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<String, OAuthError> {
        let started = Instant::now();
        let integration: Integration = integration.parse()?;
        let provider = self.providers.get(integration)?;

        let pending = self.states.begin(integration, user_id, org_id).await?;
        let challenge = pending.pkce.as_ref().map(|p| p.code_challenge.as_str());
        let url = provider.build_auth_url(&pending.state, challenge);

        info!(
            integration = %integration,
            user_id = %user_id,
            org_id = %org_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Authorization URL generated"
        );
        Ok(url)
    }

    /// Complete a flow from the provider's redirect.
    ///
    /// The state is validated first. The token request and the deletion of the
    /// consumed state run concurrently and both must finish; the state is
    /// gone afterwards even if the exchange failed, since the code it guarded
    /// is single-use anyway. Only the callback whose deletion removed the
    /// live state stores credentials; any concurrent duplicate gets
    /// `StateMismatch`.
    pub async fn handle_callback(
        &self,
        integration: &str,
        params: CallbackParams,
    ) -> Result<StateIdentity, OAuthError> {
        let started = Instant::now();
        let integration: Integration = integration.parse()?;
        self.providers.get(integration)?;

        if let Some(error) = params.error {
            warn!(
                integration = %integration,
                error = %error,
                description = ?params.error_description,
                "Provider denied authorization"
            );
            return Err(OAuthError::ProviderDenied {
                error,
                description: params.error_description,
            });
        }

        let (Some(code), Some(encoded_state)) = (non_empty(params.code), non_empty(params.state))
        else {
            warn!(integration = %integration, "Callback without code or state");
            return Err(OAuthError::MissingCallbackParams);
        };

        let validated = self.states.check_state(integration, &encoded_state).await?;
        let identity = validated.identity;
        debug!(
            integration = %integration,
            user_id = %identity.user_id,
            org_id = %identity.org_id,
            "State validated"
        );

        let (exchanged, consumed) = futures::join!(
            self.exchange
                .exchange_for(integration, &code, validated.code_verifier.as_deref()),
            self.states.consume(integration, &identity),
        );
        if !consumed? {
            warn!(
                integration = %integration,
                user_id = %identity.user_id,
                org_id = %identity.org_id,
                "State consumed by a concurrent callback"
            );
            return Err(OAuthError::StateMismatch);
        }
        let payload = exchanged?;

        self.credentials
            .store(integration, &identity.user_id, &identity.org_id, &payload)
            .await?;

        info!(
            integration = %integration,
            user_id = %identity.user_id,
            org_id = %identity.org_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "OAuth callback completed"
        );
        Ok(identity)
    }

    /// Hand the parked token payload to the caller, once.
    pub async fn get_credentials(
        &self,
        integration: &str,
        user_id: &str,
        org_id: &str,
    ) -> Result<CredentialPayload, OAuthError> {
        let started = Instant::now();
        let integration: Integration = integration.parse()?;
        let payload = self.credentials.retrieve(integration, user_id, org_id).await?;

        info!(
            integration = %integration,
            user_id = %user_id,
            org_id = %org_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Credentials handed off"
        );
        Ok(payload)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
