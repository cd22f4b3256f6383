use super::{parse_time, IntegrationItem, ItemLoader, LoadStats};
use crate::oauth::Integration;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const BASE_URL: &str = "https://api.hubapi.com/crm/v3";
const PAGE_LIMIT: u32 = 100;

/// CRM object kinds listed by the loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ObjectKind {
    Contact,
    Company,
    Deal,
}

impl ObjectKind {
    fn path(&self) -> &'static str {
        match self {
            ObjectKind::Contact => "contacts",
            ObjectKind::Company => "companies",
            ObjectKind::Deal => "deals",
        }
    }

    fn item_type(&self) -> &'static str {
        match self {
            ObjectKind::Contact => "contact",
            ObjectKind::Company => "company",
            ObjectKind::Deal => "deal",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObjectPage {
    #[serde(default)]
    results: Vec<CrmObject>,
}

#[derive(Debug, Deserialize)]
struct CrmObject {
    id: Option<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl CrmObject {
    fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Lists contacts, companies and deals from the CRM v3 API.
pub struct HubspotLoader {
    http_client: Client,
    base_url: String,
}

impl HubspotLoader {
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, BASE_URL.to_string())
    }

    /// Create a loader with a custom base URL (for testing with a mock server).
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    /// First page of one object kind. A non-2xx status yields no objects.
    async fn fetch_objects(&self, kind: ObjectKind, access_token: &str) -> Result<Vec<CrmObject>> {
        let url = format!("{}/objects/{}", self.base_url, kind.path());
        let response = self
            .http_client
            .get(&url)
            .query(&[("limit", PAGE_LIMIT)])
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send HubSpot {} request", kind.path()))?;

        if !response.status().is_success() {
            warn!(kind = kind.path(), status = %response.status(), "HubSpot listing failed, skipping");
            return Ok(Vec::new());
        }

        let page = response
            .json::<ObjectPage>()
            .await
            .with_context(|| format!("Failed to parse HubSpot {} response", kind.path()))?;
        debug!(kind = kind.path(), count = page.results.len(), "HubSpot objects fetched");
        Ok(page.results)
    }
}

#[async_trait]
impl ItemLoader for HubspotLoader {
    fn integration(&self) -> Integration {
        Integration::Hubspot
    }

    async fn load(&self, access_token: &str) -> Result<Vec<IntegrationItem>> {
        let started = Instant::now();

        let (contacts, companies, deals) = futures::try_join!(
            self.fetch_objects(ObjectKind::Contact, access_token),
            self.fetch_objects(ObjectKind::Company, access_token),
            self.fetch_objects(ObjectKind::Deal, access_token),
        )?;
        let api_duration_ms = started.elapsed().as_millis() as u64;

        let mut items = Vec::new();
        let mut stats = LoadStats::default();
        for (kind, objects) in [
            (ObjectKind::Contact, contacts),
            (ObjectKind::Company, companies),
            (ObjectKind::Deal, deals),
        ] {
            for object in &objects {
                stats.collect(&mut items, kind.item_type(), object_to_item(kind, object));
            }
        }

        info!(
            integration = "hubspot",
            total_items = items.len(),
            errors = stats.errors,
            api_duration_ms,
            duration_ms = started.elapsed().as_millis() as u64,
            "HubSpot items loaded"
        );
        Ok(items)
    }
}

fn object_to_item(kind: ObjectKind, object: &CrmObject) -> Result<IntegrationItem> {
    let id = object
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("HubSpot {} without id", kind.item_type()))?;

    let name = match kind {
        ObjectKind::Contact => {
            let full = format!(
                "{} {}",
                object.property("firstname").unwrap_or_default(),
                object.property("lastname").unwrap_or_default()
            );
            match full.trim() {
                "" => "Unnamed Contact".to_string(),
                trimmed => trimmed.to_string(),
            }
        }
        ObjectKind::Company => object.property("name").unwrap_or("Unnamed Company").to_string(),
        ObjectKind::Deal => object.property("dealname").unwrap_or("Unnamed Deal").to_string(),
    };

    let mut item = IntegrationItem::new(id, kind.item_type(), name);
    item.creation_time = parse_time(object.property("createdate"))?;
    item.last_modified_time = parse_time(object.property("lastmodifieddate"))?;
    item.url = object.property("hubspot_owner_id").map(|owner| {
        format!(
            "https://app.hubspot.com/contacts/{}/{}/{}",
            owner,
            kind.item_type(),
            id
        )
    });
    Ok(item)
}
