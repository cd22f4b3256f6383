//! OAuth token exchange logic.
//!
//! Handles exchanging authorization codes for access tokens. Providers
//! disagree on how the request looks: the body is form-urlencoded or JSON and
//! the client credentials travel in the body or in a Basic header. Those
//! conventions come from [`Integration`] and are not interchangeable.

use super::provider::{BodyEncoding, ClientAuth, Integration, ProviderConfig, ProviderRegistry};
use super::{CredentialPayload, OAuthError};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Swaps authorization codes for token payloads.
#[derive(Clone)]
pub struct TokenExchangeClient {
    providers: Arc<ProviderRegistry>,
    http_client: reqwest::Client,
}

impl TokenExchangeClient {
    /// `http_client` should carry a request timeout; none is added here.
    pub fn new(providers: Arc<ProviderRegistry>, http_client: reqwest::Client) -> Self {
        Self {
            providers,
            http_client,
        }
    }

    /// Exchange an authorization code for the provider's token payload.
    ///
    /// # Arguments
    /// * `integration` - Integration name (e.g. "hubspot")
    /// * `code` - Authorization code from callback
    /// * `code_verifier` - PKCE verifier, when one was generated for this flow
    ///
    /// # Returns
    /// * `Ok(CredentialPayload)` - The token response, verbatim
    /// * `Err(UnsupportedIntegration)` - Unknown name; no request is sent
    /// * `Err(TokenExchangeFailed)` - Non-2xx status or a non-object body
    pub async fn exchange(
        &self,
        integration: &str,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<CredentialPayload, OAuthError> {
        let integration: Integration = integration.parse()?;
        self.exchange_for(integration, code, code_verifier).await
    }

    pub async fn exchange_for(
        &self,
        integration: Integration,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<CredentialPayload, OAuthError> {
        let provider = self.providers.get(integration)?;
        let fields = token_request_fields(provider, code, code_verifier);

        debug!(
            integration = %integration,
            token_url = %provider.token_url,
            has_verifier = code_verifier.is_some(),
            "Exchanging authorization code for token"
        );

        let mut request = self
            .http_client
            .post(&provider.token_url)
            .header(ACCEPT, "application/json");

        if matches!(
            integration.client_auth(),
            ClientAuth::BasicHeader | ClientAuth::BasicHeaderWithClientId
        ) {
            request = request.basic_auth(&provider.client_id, Some(&provider.client_secret));
        }

        request = match integration.body_encoding() {
            BodyEncoding::Form => request.form(&fields),
            BodyEncoding::Json => {
                let body: serde_json::Map<String, Value> = fields
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), Value::String(value)))
                    .collect();
                request.json(&body)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(
                integration = %integration,
                status = %status,
                "Token exchange failed"
            );
            return Err(OAuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(payload)) => {
                debug!(
                    integration = %integration,
                    has_access_token = payload.contains_key("access_token"),
                    has_refresh_token = payload.contains_key("refresh_token"),
                    "Token exchange successful"
                );
                Ok(payload)
            }
            _ => {
                error!(integration = %integration, "Token endpoint returned a non-object body");
                Err(OAuthError::TokenExchangeFailed {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

/// Body fields of the token request, in the provider's convention.
fn token_request_fields(
    provider: &ProviderConfig,
    code: &str,
    code_verifier: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", provider.redirect_uri.clone()),
    ];

    match provider.integration.client_auth() {
        ClientAuth::RequestBody => {
            fields.push(("client_id", provider.client_id.clone()));
            fields.push(("client_secret", provider.client_secret.clone()));
        }
        ClientAuth::BasicHeaderWithClientId => {
            fields.push(("client_id", provider.client_id.clone()));
        }
        ClientAuth::BasicHeader => {}
    }

    if let Some(verifier) = code_verifier {
        fields.push(("code_verifier", verifier.to_string()));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    // base64("test_id:test_secret")
    const BASIC_AUTH: &str = "Basic dGVzdF9pZDp0ZXN0X3NlY3JldA==";

    fn provider(integration: Integration, token_url: String) -> ProviderConfig {
        ProviderConfig {
            integration,
            client_id: "test_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:8000/callback".to_string(),
            scopes: vec![],
            token_url,
        }
    }

    fn client_for(integration: Integration, token_url: String) -> TokenExchangeClient {
        TokenExchangeClient::new(
            Arc::new(ProviderRegistry::new([provider(integration, token_url)])),
            reqwest::Client::new(),
        )
    }

    fn field<'a>(fields: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn test_request_fields_per_convention() {
        let hubspot = token_request_fields(
            &provider(Integration::Hubspot, String::new()),
            "code1",
            None,
        );
        assert_eq!(field(&hubspot, "grant_type"), Some("authorization_code"));
        assert_eq!(field(&hubspot, "client_id"), Some("test_id"));
        assert_eq!(field(&hubspot, "client_secret"), Some("test_secret"));
        assert_eq!(field(&hubspot, "code_verifier"), None);

        let notion = token_request_fields(
            &provider(Integration::Notion, String::new()),
            "code1",
            None,
        );
        assert_eq!(field(&notion, "client_id"), None);
        assert_eq!(field(&notion, "client_secret"), None);
        assert_eq!(field(&notion, "redirect_uri"), Some("http://localhost:8000/callback"));

        let airtable = token_request_fields(
            &provider(Integration::Airtable, String::new()),
            "code1",
            Some("verifier1"),
        );
        assert_eq!(field(&airtable, "client_id"), Some("test_id"));
        assert_eq!(field(&airtable, "client_secret"), None);
        assert_eq!(field(&airtable, "code_verifier"), Some("verifier1"));
    }

    #[tokio::test]
    async fn test_hubspot_form_body_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "auth_code_123".into()),
                Matcher::UrlEncoded("client_id".into(), "test_id".into()),
                Matcher::UrlEncoded("client_secret".into(), "test_secret".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "http://localhost:8000/callback".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok123","refresh_token":"ref456","expires_in":1800}"#)
            .create_async()
            .await;

        let client = client_for(Integration::Hubspot, format!("{}/token", server.url()));
        let payload = client
            .exchange("hubspot", "auth_code_123", None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(payload["access_token"], "tok123");
        assert_eq!(payload["refresh_token"], "ref456");
        assert_eq!(payload["expires_in"], 1800);
    }

    #[tokio::test]
    async fn test_notion_json_body_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("authorization", BASIC_AUTH)
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "grant_type": "authorization_code",
                "code": "auth_code_123",
                "redirect_uri": "http://localhost:8000/callback",
            })))
            .with_status(200)
            .with_body(r#"{"access_token":"secret_abc","workspace_id":"ws1","bot_id":"b1"}"#)
            .create_async()
            .await;

        let client = client_for(Integration::Notion, format!("{}/token", server.url()));
        let payload = client
            .exchange("notion", "auth_code_123", None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(payload["workspace_id"], "ws1");
    }

    #[tokio::test]
    async fn test_airtable_form_body_with_verifier() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_header("authorization", BASIC_AUTH)
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "test_id".into()),
                Matcher::UrlEncoded("code_verifier".into(), "verifier_xyz".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"at","token_type":"bearer","scope":"schema.bases:read"}"#)
            .create_async()
            .await;

        let client = client_for(Integration::Airtable, format!("{}/token", server.url()));
        let payload = client
            .exchange("airtable", "auth_code_123", Some("verifier_xyz"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(payload["token_type"], "bearer");
    }

    #[tokio::test]
    async fn test_non_success_status_surfaces_upstream_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let client = client_for(Integration::Hubspot, format!("{}/token", server.url()));
        let err = client
            .exchange("hubspot", "used_code", None)
            .await
            .unwrap_err();

        // No retry: exactly one request
        mock.assert_async().await;
        match err {
            OAuthError::TokenExchangeFailed { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_object_body_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body("access_token=tok&token_type=bearer")
            .create_async()
            .await;

        let client = client_for(Integration::Hubspot, format!("{}/token", server.url()));
        let err = client.exchange("hubspot", "code", None).await.unwrap_err();
        assert!(matches!(err, OAuthError::TokenExchangeFailed { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_unknown_integration_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(Integration::Hubspot, format!("{}/token", server.url()));
        let err = client
            .exchange("unknown-provider", "code", None)
            .await
            .unwrap_err();

        assert!(matches!(err, OAuthError::UnsupportedIntegration(name) if name == "unknown-provider"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unconfigured_integration() {
        let client = client_for(Integration::Hubspot, "http://127.0.0.1:9/token".to_string());
        let err = client.exchange("notion", "code", None).await.unwrap_err();
        assert!(matches!(err, OAuthError::NotConfigured(Integration::Notion)));
    }
}
