//! Single-use credential handoff.
//!
//! A successful callback parks the token payload here until the frontend
//! fetches it once. Reading deletes it; unread payloads expire with their TTL.

use super::provider::Integration;
use super::{cache_key, CredentialPayload, OAuthError};
use crate::store::KeyValueStore;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CredentialCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_seconds: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Park `payload` for `(integration, user_id, org_id)`, replacing any
    /// unread payload for the same triple.
    pub async fn store(
        &self,
        integration: Integration,
        user_id: &str,
        org_id: &str,
        payload: &CredentialPayload,
    ) -> Result<(), OAuthError> {
        let key = cache_key(integration, "credentials", org_id, user_id);
        // Serializing a JSON map cannot fail
        let value = Value::Object(payload.clone()).to_string();

        self.store.set(&key, &value, Some(self.ttl)).await?;
        debug!(key = %key, "Credentials stored");
        Ok(())
    }

    /// Take the parked payload. A second call fails with `CredentialsNotFound`.
    pub async fn retrieve(
        &self,
        integration: Integration,
        user_id: &str,
        org_id: &str,
    ) -> Result<CredentialPayload, OAuthError> {
        let key = cache_key(integration, "credentials", org_id, user_id);

        let raw = match self.store.get(&key).await? {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                warn!(key = %key, "No credentials found");
                return Err(OAuthError::CredentialsNotFound);
            }
        };

        let payload = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(payload)) if !payload.is_empty() => payload,
            _ => {
                warn!(key = %key, "Stored credentials are not a JSON object");
                return Err(OAuthError::InvalidCredentialsFormat);
            }
        };

        // Only the caller whose delete removed the entry gets the payload
        if !self.store.delete(&key).await? {
            warn!(key = %key, "Credentials taken by a concurrent request");
            return Err(OAuthError::CredentialsNotFound);
        }
        debug!(key = %key, "Credentials retrieved and deleted");
        Ok(payload)
    }
}
