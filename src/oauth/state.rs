//! OAuth state management for CSRF protection.
//!
//! The `state` parameter round-tripped through the provider carries the whole
//! (csrf token, user_id, org_id) triple so the callback can recover who started
//! the flow without a session. A copy is kept in the key-value store under
//! `{integration}_state:{org_id}:{user_id}`; a callback is only accepted when
//! its embedded token matches that copy. Reading the encoded state from a
//! redirect URL does not let anyone forge one, because they cannot make the
//! stored copy exist.
//!
//! Wire format: base64url (no padding) over a versioned JSON object
//! `{"v":1,"state":"…","user_id":"…","org_id":"…"}`. Unknown fields and
//! unknown versions are rejected.

use super::pkce::PkcePair;
use super::provider::Integration;
use super::{cache_key, OAuthError};
use crate::store::KeyValueStore;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Duration;
use rand::RngCore;
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

const STATE_FORMAT_VERSION: u8 = 1;
const CSRF_TOKEN_BYTES: usize = 32;

/// Decoded form of the `state` parameter and of the stored record.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct WireState {
    v: u8,
    state: Option<String>,
    user_id: Option<String>,
    org_id: Option<String>,
}

impl WireState {
    fn to_json(csrf_token: &str, user_id: &str, org_id: &str) -> String {
        serde_json::json!({
            "v": STATE_FORMAT_VERSION,
            "state": csrf_token,
            "user_id": user_id,
            "org_id": org_id,
        })
        .to_string()
    }
}

/// Who initiated a flow, recovered from a validated state parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateIdentity {
    pub user_id: String,
    pub org_id: String,
}

/// Result of [`StateManager::begin`]: what goes into the authorization URL.
#[derive(Clone, Debug)]
pub struct PendingAuthorization {
    pub state: String,
    pub pkce: Option<PkcePair>,
}

/// A state that matched its stored copy but has not been consumed yet.
#[derive(Clone, Debug)]
pub struct ValidatedState {
    pub identity: StateIdentity,
    /// PKCE verifier stored alongside the state, for integrations that use one.
    pub code_verifier: Option<String>,
}

/// OAuth state manager backed by the shared key-value store.
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn KeyValueStore>,
    expiry: Duration,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `store` - Shared key-value store
    /// * `expiry_seconds` - How long states remain valid
    pub fn new(store: Arc<dyn KeyValueStore>, expiry_seconds: i64) -> Self {
        Self {
            store,
            expiry: Duration::seconds(expiry_seconds),
        }
    }

    /// Generate a state token for `(integration, user_id, org_id)`, store it,
    /// and return the encoded value for the authorization URL.
    ///
    /// Overwrites any earlier pending state for the same triple.
    pub async fn generate_and_store_state(
        &self,
        integration: Integration,
        user_id: &str,
        org_id: &str,
    ) -> Result<String, OAuthError> {
        Ok(self.begin(integration, user_id, org_id).await?.state)
    }

    /// Start an authorization attempt: store a fresh state and, for PKCE
    /// integrations, a fresh verifier under the sibling key with the same TTL.
    pub async fn begin(
        &self,
        integration: Integration,
        user_id: &str,
        org_id: &str,
    ) -> Result<PendingAuthorization, OAuthError> {
        let csrf_token = generate_csrf_token();
        let record = WireState::to_json(&csrf_token, user_id, org_id);
        let state_key = cache_key(integration, "state", org_id, user_id);

        debug!(
            integration = %integration,
            user_id = %user_id,
            org_id = %org_id,
            "Storing OAuth state"
        );

        let pkce = if integration.uses_pkce() {
            let pair = PkcePair::generate();
            let verifier_key = cache_key(integration, "verifier", org_id, user_id);
            futures::try_join!(
                self.store.set(&state_key, &record, Some(self.expiry)),
                self.store
                    .set(&verifier_key, &pair.code_verifier, Some(self.expiry)),
            )?;
            Some(pair)
        } else {
            self.store
                .set(&state_key, &record, Some(self.expiry))
                .await?;
            None
        };

        Ok(PendingAuthorization {
            state: URL_SAFE_NO_PAD.encode(record.as_bytes()),
            pkce,
        })
    }

    /// Validate a callback's state against the stored copy and consume it.
    ///
    /// A second call with the same value fails with `StateMismatch`.
    pub async fn validate_state(
        &self,
        integration: Integration,
        encoded_state: &str,
    ) -> Result<StateIdentity, OAuthError> {
        let validated = self.check_state(integration, encoded_state).await?;
        if !self.consume(integration, &validated.identity).await? {
            return Err(OAuthError::StateMismatch);
        }
        Ok(validated.identity)
    }

    /// Validate a callback's state without consuming it.
    ///
    /// The stored state and (for PKCE integrations) verifier are fetched
    /// concurrently. Callers must [`consume`](Self::consume) afterwards.
    pub async fn check_state(
        &self,
        integration: Integration,
        encoded_state: &str,
    ) -> Result<ValidatedState, OAuthError> {
        let (csrf_token, identity) = decode_state(encoded_state)?;
        let state_key = cache_key(integration, "state", &identity.org_id, &identity.user_id);

        let (saved_state, code_verifier) = if integration.uses_pkce() {
            let verifier_key =
                cache_key(integration, "verifier", &identity.org_id, &identity.user_id);
            futures::try_join!(self.store.get(&state_key), self.store.get(&verifier_key))?
        } else {
            (self.store.get(&state_key).await?, None)
        };

        let matches = saved_state
            .as_deref()
            .and_then(stored_csrf_token)
            .is_some_and(|saved| bool::from(saved.as_bytes().ct_eq(csrf_token.as_bytes())));

        if !matches {
            warn!(
                integration = %integration,
                user_id = %identity.user_id,
                org_id = %identity.org_id,
                found = saved_state.is_some(),
                "State mismatch (missing, expired or forged)"
            );
            return Err(OAuthError::StateMismatch);
        }

        if integration.uses_pkce() && code_verifier.is_none() {
            warn!(integration = %integration, "PKCE verifier missing for a live state");
            return Err(OAuthError::StateMismatch);
        }

        Ok(ValidatedState {
            identity,
            code_verifier,
        })
    }

    /// Delete the state record (and verifier) for a validated flow.
    ///
    /// Returns whether this call removed the live state record. Of several
    /// callers racing on the same state, only one gets `true`.
    pub async fn consume(
        &self,
        integration: Integration,
        identity: &StateIdentity,
    ) -> Result<bool, OAuthError> {
        let state_key = cache_key(integration, "state", &identity.org_id, &identity.user_id);

        let removed = if integration.uses_pkce() {
            let verifier_key =
                cache_key(integration, "verifier", &identity.org_id, &identity.user_id);
            let (removed, _) = futures::try_join!(
                self.store.delete(&state_key),
                self.store.delete(&verifier_key)
            )?;
            removed
        } else {
            self.store.delete(&state_key).await?
        };

        if !removed {
            debug!(key = %state_key, "State already consumed");
        }
        Ok(removed)
    }
}

fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode the `state` query parameter into its CSRF token and identity.
fn decode_state(encoded_state: &str) -> Result<(String, StateIdentity), OAuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(encoded_state.trim())
        .map_err(|_| OAuthError::InvalidStateFormat)?;
    let wire: WireState =
        serde_json::from_slice(&raw).map_err(|_| OAuthError::InvalidStateFormat)?;

    if wire.v != STATE_FORMAT_VERSION {
        return Err(OAuthError::InvalidStateFormat);
    }

    match (non_empty(wire.state), non_empty(wire.user_id), non_empty(wire.org_id)) {
        (Some(state), Some(user_id), Some(org_id)) => Ok((state, StateIdentity { user_id, org_id })),
        _ => Err(OAuthError::MissingStateFields),
    }
}

/// CSRF token of a stored record; `None` if the record is unreadable.
fn stored_csrf_token(record: &str) -> Option<String> {
    serde_json::from_str::<WireState>(record)
        .ok()
        .and_then(|wire| non_empty(wire.state))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
