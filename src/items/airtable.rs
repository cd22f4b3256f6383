use super::{IntegrationItem, ItemLoader, LoadStats};
use crate::oauth::Integration;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const BASE_URL: &str = "https://api.airtable.com";

#[derive(Debug, Deserialize)]
struct BasesPage {
    #[serde(default)]
    bases: Vec<MetaObject>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TablesResponse {
    #[serde(default)]
    tables: Vec<MetaObject>,
}

/// A base or a table; both are listed as `{id, name}`.
#[derive(Debug, Clone, Deserialize)]
struct MetaObject {
    id: Option<String>,
    name: Option<String>,
}

/// Lists bases and their tables through the metadata API.
pub struct AirtableLoader {
    http_client: Client,
    base_url: String,
}

impl AirtableLoader {
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

    /// Every base the token can see, following `offset` until exhausted.
    async fn fetch_bases(&self, access_token: &str) -> Result<Vec<MetaObject>> {
        let url = format!("{}/v0/meta/bases", self.base_url);
        let mut bases = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self.http_client.get(&url).bearer_auth(access_token);
            if let Some(cursor) = &offset {
                request = request.query(&[("offset", cursor)]);
            }

            let response = request
                .send()
                .await
                .context("Failed to send Airtable bases request")?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                bail!("Failed to fetch bases from Airtable ({}): {}", status, body);
            }

            let page = response
                .json::<BasesPage>()
                .await
                .context("Failed to parse Airtable bases response")?;
            debug!(count = page.bases.len(), has_more = page.offset.is_some(), "Airtable bases page fetched");
            bases.extend(page.bases);

            match page.offset.filter(|o| !o.is_empty()) {
                Some(next) if offset.as_deref() == Some(next.as_str()) => {
                    bail!("Airtable returned the same bases offset twice: {}", next);
                }
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(bases)
    }

    /// Tables of one base. A non-2xx status yields no tables.
    async fn fetch_tables(&self, access_token: &str, base_id: &str) -> Result<Vec<MetaObject>> {
        let url = format!("{}/v0/meta/bases/{}/tables", self.base_url, base_id);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send Airtable tables request for {}", base_id))?;

        if !response.status().is_success() {
            warn!(base_id = %base_id, status = %response.status(), "Airtable tables listing failed, skipping base");
            return Ok(Vec::new());
        }

        let tables = response
            .json::<TablesResponse>()
            .await
            .with_context(|| format!("Failed to parse Airtable tables for {}", base_id))?;
        Ok(tables.tables)
    }
}

#[async_trait]
impl ItemLoader for AirtableLoader {
    fn integration(&self) -> Integration {
        Integration::Airtable
    }

    async fn load(&self, access_token: &str) -> Result<Vec<IntegrationItem>> {
        let started = Instant::now();
        let bases = self.fetch_bases(access_token).await?;

        let mut items = Vec::new();
        let mut stats = LoadStats::default();
        let mut listed_bases = Vec::new();
        for base in &bases {
            stats.collect(&mut items, "base", base_to_item(base));
            if let Some(id) = base.id.as_deref().filter(|id| !id.is_empty()) {
                listed_bases.push((id, base.name.as_deref()));
            }
        }

        let tables = try_join_all(
            listed_bases
                .iter()
                .map(|(base_id, _)| self.fetch_tables(access_token, base_id)),
        )
        .await?;

        for ((base_id, base_name), tables) in listed_bases.iter().zip(tables) {
            for table in &tables {
                stats.collect(&mut items, "table", table_to_item(table, base_id, *base_name));
            }
        }

        info!(
            integration = "airtable",
            bases = listed_bases.len(),
            total_items = items.len(),
            errors = stats.errors,
            duration_ms = started.elapsed().as_millis() as u64,
            "Airtable items loaded"
        );
        Ok(items)
    }
}

fn base_to_item(base: &MetaObject) -> Result<IntegrationItem> {
    let id = base
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("Airtable base without id"))?;
    Ok(IntegrationItem::new(
        format!("{}_Base", id),
        "Base",
        base.name.clone().unwrap_or_default(),
    ))
}

fn table_to_item(table: &MetaObject, base_id: &str, base_name: Option<&str>) -> Result<IntegrationItem> {
    let id = table
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("Airtable table without id in base {}", base_id))?;

    let mut item = IntegrationItem::new(
        format!("{}_Table", id),
        "Table",
        table.name.clone().unwrap_or_default(),
    );
    item.parent_id = Some(format!("{}_Base", base_id));
    item.parent_path_or_name = base_name.map(str::to_string);
    Ok(item)
}
