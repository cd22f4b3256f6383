//! Provider item loaders.
//!
//! Each integration lists its resources (CRM objects, pages, bases) through
//! its own API; loaders normalize them into [`IntegrationItem`]s for the
//! frontend. A record that fails to normalize is logged and counted, and the
//! rest of the batch is still returned.

pub mod airtable;
pub mod hubspot;
pub mod notion;

pub use airtable::AirtableLoader;
pub use hubspot::HubspotLoader;
pub use notion::NotionLoader;

use crate::oauth::{CredentialPayload, Integration};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Provider-neutral description of one listed resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub directory: bool,
    pub parent_path_or_name: Option<String>,
    pub parent_id: Option<String>,
    pub name: String,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub children: Option<Vec<String>>,
    pub mime_type: Option<String>,
    pub delta: Option<String>,
    pub drive_id: Option<String>,
    pub visibility: bool,
}

impl IntegrationItem {
    pub fn new(id: impl Into<String>, item_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_type: item_type.into(),
            directory: false,
            parent_path_or_name: None,
            parent_id: None,
            name: name.into(),
            creation_time: None,
            last_modified_time: None,
            url: None,
            children: None,
            mime_type: None,
            delta: None,
            drive_id: None,
            visibility: true,
        }
    }
}

/// Lists an integration's resources with an access token.
#[async_trait]
pub trait ItemLoader: Send + Sync {
    fn integration(&self) -> Integration;

    async fn load(&self, access_token: &str) -> Result<Vec<IntegrationItem>>;
}

/// Per-batch normalization counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub errors: usize,
}

impl LoadStats {
    /// Keep a normalized record, or log and count its failure.
    pub fn collect(
        &mut self,
        items: &mut Vec<IntegrationItem>,
        kind: &str,
        result: Result<IntegrationItem>,
    ) {
        match result {
            Ok(item) => {
                self.loaded += 1;
                items.push(item);
            }
            Err(e) => {
                self.errors += 1;
                warn!(kind = %kind, error = %e, "Skipping record that failed to normalize");
            }
        }
    }
}

/// Access token of a credential payload, if it carries a non-empty one.
pub fn access_token(credentials: &CredentialPayload) -> Option<&str> {
    credentials
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
}

/// Parse an RFC 3339 timestamp field; absent or empty is `None`.
pub(crate) fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| anyhow!("Invalid timestamp {:?}: {}", raw, e)),
    }
}

/// One loader per integration.
#[derive(Clone)]
pub struct ItemLoaders {
    loaders: HashMap<Integration, Arc<dyn ItemLoader>>,
}

impl ItemLoaders {
    /// Loaders against the real provider APIs.
    pub fn new(http_client: reqwest::Client) -> Self {
        Self::from_loaders([
            Arc::new(HubspotLoader::new(http_client.clone())) as Arc<dyn ItemLoader>,
            Arc::new(NotionLoader::new(http_client.clone())),
            Arc::new(AirtableLoader::new(http_client)),
        ])
    }

    pub fn from_loaders(loaders: impl IntoIterator<Item = Arc<dyn ItemLoader>>) -> Self {
        Self {
            loaders: loaders
                .into_iter()
                .map(|loader| (loader.integration(), loader))
                .collect(),
        }
    }

    /// Load items for `integration` with an already extracted access token.
    pub async fn load(&self, integration: Integration, token: &str) -> Result<Vec<IntegrationItem>> {
        let loader = self
            .loaders
            .get(&integration)
            .ok_or_else(|| anyhow!("No item loader for {}", integration))?;
        loader.load(token).await
    }
}
