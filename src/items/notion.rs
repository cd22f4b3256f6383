use super::{parse_time, IntegrationItem, ItemLoader, LoadStats};
use crate::oauth::Integration;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

pub const BASE_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// Lists pages and databases shared with the integration via `/v1/search`.
pub struct NotionLoader {
    http_client: Client,
    base_url: String,
}

impl NotionLoader {
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
}

#[async_trait]
impl ItemLoader for NotionLoader {
    fn integration(&self) -> Integration {
        Integration::Notion
    }

    async fn load(&self, access_token: &str) -> Result<Vec<IntegrationItem>> {
        let started = Instant::now();
        let url = format!("{}/v1/search", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Failed to send Notion search request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Notion search failed with status {}: {}", status, body);
        }

        let search = response
            .json::<SearchResponse>()
            .await
            .context("Failed to parse Notion search response")?;

        let mut items = Vec::new();
        let mut stats = LoadStats::default();
        for result in &search.results {
            stats.collect(&mut items, "notion object", result_to_item(result));
        }

        info!(
            integration = "notion",
            total_items = items.len(),
            errors = stats.errors,
            duration_ms = started.elapsed().as_millis() as u64,
            "Notion items loaded"
        );
        Ok(items)
    }
}

fn result_to_item(result: &Value) -> Result<IntegrationItem> {
    let id = result
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Notion result without id"))?;
    let object = result.get("object").and_then(Value::as_str).unwrap_or_default();

    // Titles live under properties; anything else with `content` is a fallback
    let title = result
        .get("properties")
        .and_then(|p| find_key(p, "content"))
        .or_else(|| find_key(result, "content"))
        .map(display_value)
        .unwrap_or_else(|| "multi_select".to_string());

    let mut item = IntegrationItem::new(id, object, format!("{} {}", object, title));
    item.parent_id = parent_id(result);
    item.creation_time = parse_time(result.get("created_time").and_then(Value::as_str))?;
    item.last_modified_time = parse_time(result.get("last_edited_time").and_then(Value::as_str))?;
    Ok(item)
}

/// Depth-first search for the first non-null value stored under `key`.
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key).filter(|v| !v.is_null()) {
                return Some(found);
            }
            map.values().find_map(|v| find_key(v, key))
        }
        Value::Array(values) => values.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `parent[parent.type]`, except workspace-level objects which have no parent.
fn parent_id(result: &Value) -> Option<String> {
    let parent = result.get("parent")?;
    let parent_type = parent.get("type").and_then(Value::as_str)?;
    if parent_type == "workspace" {
        return None;
    }
    parent.get(parent_type).map(display_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    #[test]
    fn test_page_title_and_parent() {
        let page = json!({
            "object": "page",
            "id": "page-1",
            "created_time": "2024-03-01T12:00:00.000Z",
            "last_edited_time": "2024-03-02T12:00:00.000Z",
            "parent": {"type": "database_id", "database_id": "db-9"},
            "properties": {
                "Name": {"title": [{"text": {"content": "Roadmap"}}]}
            }
        });

        let item = result_to_item(&page).unwrap();
        assert_eq!(item.id, "page-1");
        assert_eq!(item.item_type, "page");
        assert_eq!(item.name, "page Roadmap");
        assert_eq!(item.parent_id.as_deref(), Some("db-9"));
        assert!(item.creation_time.is_some());
    }

    #[test]
    fn test_workspace_parent_and_title_outside_properties() {
        let database = json!({
            "object": "database",
            "id": "db-1",
            "parent": {"type": "workspace", "workspace": true},
            "title": [{"text": {"content": "Tasks"}}],
            "properties": {"Status": {"select": {}}}
        });

        let item = result_to_item(&database).unwrap();
        assert_eq!(item.name, "database Tasks");
        assert!(item.parent_id.is_none());
    }

    #[test]
    fn test_untitled_falls_back() {
        let page = json!({"object": "page", "id": "p", "properties": {}});
        assert_eq!(result_to_item(&page).unwrap().name, "page multi_select");
    }

    #[test]
    fn test_result_without_id_is_an_error() {
        assert!(result_to_item(&json!({"object": "page"})).is_err());
    }

    #[tokio::test]
    async fn test_load_sends_version_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/search")
            .match_header("authorization", "Bearer secret_tok")
            .match_header("notion-version", NOTION_VERSION)
            .with_status(200)
            .with_body(
                r#"{"object":"list","results":[
                    {"object":"page","id":"a","properties":{"title":{"title":[{"text":{"content":"One"}}]}}},
                    {"object":"page"}
                ]}"#,
            )
            .create_async()
            .await;

        let loader = NotionLoader::with_base_url(Client::new(), server.url());
        let items = loader.load("secret_tok").await.unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "page One");
    }

    #[tokio::test]
    async fn test_load_fails_on_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/search")
            .with_status(401)
            .with_body(r#"{"code":"unauthorized"}"#)
            .create_async()
            .await;

        let loader = NotionLoader::with_base_url(Client::new(), server.url());
        let err = loader.load("bad").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
