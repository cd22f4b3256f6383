//! OAuth provider configurations.
//!
//! Each supported integration is a variant of [`Integration`] carrying its
//! static OAuth contract (endpoints, default scopes, PKCE and token-request
//! conventions). Client credentials come from configuration and are combined
//! into a [`ProviderConfig`] once at startup.

use super::OAuthError;
use crate::config::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Supported third-party integrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    Hubspot,
    Notion,
    Airtable,
}

/// How the token request body is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyEncoding {
    Form,
    Json,
}

/// Where the client credentials go in the token request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAuth {
    /// `client_id` and `client_secret` as body fields.
    RequestBody,
    /// `Authorization: Basic base64(client_id:client_secret)`.
    BasicHeader,
    /// Basic header, plus `client_id` repeated in the body.
    BasicHeaderWithClientId,
}

impl Integration {
    pub const ALL: [Integration; 3] = [Integration::Hubspot, Integration::Notion, Integration::Airtable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Integration::Hubspot => "hubspot",
            Integration::Notion => "notion",
            Integration::Airtable => "airtable",
        }
    }

    /// OAuth authorization endpoint URL
    pub fn auth_url(&self) -> &'static str {
        match self {
            Integration::Hubspot => "https://app.hubspot.com/oauth/authorize",
            Integration::Notion => "https://api.notion.com/v1/oauth/authorize",
            Integration::Airtable => "https://airtable.com/oauth2/v1/authorize",
        }
    }

    /// OAuth token exchange endpoint URL
    pub fn token_url(&self) -> &'static str {
        match self {
            Integration::Hubspot => "https://api.hubapi.com/oauth/v1/token",
            Integration::Notion => "https://api.notion.com/v1/oauth/token",
            Integration::Airtable => "https://airtable.com/oauth2/v1/token",
        }
    }

    pub fn default_scopes(&self) -> &'static [&'static str] {
        match self {
            Integration::Hubspot => &[
                "crm.objects.contacts.read",
                "crm.objects.companies.read",
                "crm.objects.deals.read",
                "oauth",
            ],
            // Notion grants capabilities at install time, not through scopes
            Integration::Notion => &[],
            Integration::Airtable => &[
                "data.records:read",
                "data.records:write",
                "data.recordComments:read",
                "data.recordComments:write",
                "schema.bases:read",
                "schema.bases:write",
            ],
        }
    }

    pub fn uses_pkce(&self) -> bool {
        matches!(self, Integration::Airtable)
    }

    pub fn body_encoding(&self) -> BodyEncoding {
        match self {
            Integration::Notion => BodyEncoding::Json,
            Integration::Hubspot | Integration::Airtable => BodyEncoding::Form,
        }
    }

    pub fn client_auth(&self) -> ClientAuth {
        match self {
            Integration::Hubspot => ClientAuth::RequestBody,
            Integration::Notion => ClientAuth::BasicHeader,
            Integration::Airtable => ClientAuth::BasicHeaderWithClientId,
        }
    }

    /// Whether the authorization URL carries `response_type=code&owner=user`.
    fn requests_user_owner(&self) -> bool {
        matches!(self, Integration::Notion | Integration::Airtable)
    }
}

impl fmt::Display for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Integration {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Integration::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| OAuthError::UnsupportedIntegration(s.to_string()))
    }
}

/// Fully resolved OAuth settings for one integration.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub integration: Integration,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Token endpoint; the integration's own unless overridden in config.
    pub token_url: String,
}

impl ProviderConfig {
    /// Build the authorization URL for the browser redirect.
    ///
    /// `code_challenge` is only included for integrations that use PKCE.
    pub fn build_auth_url(&self, state: &str, code_challenge: Option<&str>) -> String {
        let scopes = self.scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![("client_id", self.client_id.as_str())];

        if self.integration.requests_user_owner() {
            params.push(("response_type", "code"));
            params.push(("owner", "user"));
        }
        params.push(("redirect_uri", self.redirect_uri.as_str()));
        params.push(("state", state));

        if self.integration.uses_pkce() {
            if let Some(challenge) = code_challenge {
                params.push(("code_challenge", challenge));
                params.push(("code_challenge_method", "S256"));
            }
        }
        if !scopes.is_empty() {
            params.push(("scope", scopes.as_str()));
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.integration.auth_url(), query)
    }
}

/// Configured providers, resolved once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Integration, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        Self {
            providers: configs.into_iter().map(|c| (c.integration, c)).collect(),
        }
    }

    /// Resolve every `[providers.<name>]` table of the configuration.
    ///
    /// Unknown provider names fail here rather than at request time. Providers
    /// without a client id and secret are skipped and report `NotConfigured`
    /// when used.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, OAuthError> {
        let mut providers = HashMap::new();

        for (name, settings) in &config.providers {
            let integration: Integration = name.parse()?;

            let (Some(client_id), Some(client_secret)) =
                (settings.client_id.clone(), settings.client_secret.clone())
            else {
                tracing::warn!(integration = %integration, "Client id or secret missing, integration disabled");
                continue;
            };

            let redirect_uri = settings.redirect_uri.clone().unwrap_or_else(|| {
                format!(
                    "{}/integrations/{}/oauth2callback",
                    config.server.public_base_url.trim_end_matches('/'),
                    integration
                )
            });
            let scopes = settings.scopes.clone().unwrap_or_else(|| {
                integration
                    .default_scopes()
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });
            let token_url = settings
                .token_url
                .clone()
                .unwrap_or_else(|| integration.token_url().to_string());

            providers.insert(
                integration,
                ProviderConfig {
                    integration,
                    client_id,
                    client_secret,
                    redirect_uri,
                    scopes,
                    token_url,
                },
            );
        }

        Ok(Self { providers })
    }

    pub fn get(&self, integration: Integration) -> Result<&ProviderConfig, OAuthError> {
        self.providers
            .get(&integration)
            .ok_or(OAuthError::NotConfigured(integration))
    }

    pub fn is_configured(&self, integration: Integration) -> bool {
        self.providers.contains_key(&integration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;

    fn test_config(integration: Integration) -> ProviderConfig {
        ProviderConfig {
            integration,
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: format!("http://localhost:8000/integrations/{}/oauth2callback", integration),
            scopes: integration.default_scopes().iter().map(|s| s.to_string()).collect(),
            token_url: integration.token_url().to_string(),
        }
    }

    #[test]
    fn test_parse_integration_names() {
        assert_eq!("hubspot".parse::<Integration>().unwrap(), Integration::Hubspot);
        assert_eq!("notion".parse::<Integration>().unwrap(), Integration::Notion);
        assert_eq!("airtable".parse::<Integration>().unwrap(), Integration::Airtable);

        let err = "unknown-provider".parse::<Integration>().unwrap_err();
        assert!(matches!(err, OAuthError::UnsupportedIntegration(name) if name == "unknown-provider"));
        assert!("HubSpot".parse::<Integration>().is_err());
        assert!("".parse::<Integration>().is_err());
    }

    #[test]
    fn test_token_conventions() {
        assert_eq!(Integration::Hubspot.body_encoding(), BodyEncoding::Form);
        assert_eq!(Integration::Hubspot.client_auth(), ClientAuth::RequestBody);
        assert_eq!(Integration::Notion.body_encoding(), BodyEncoding::Json);
        assert_eq!(Integration::Notion.client_auth(), ClientAuth::BasicHeader);
        assert_eq!(Integration::Airtable.body_encoding(), BodyEncoding::Form);
        assert_eq!(Integration::Airtable.client_auth(), ClientAuth::BasicHeaderWithClientId);

        assert!(Integration::Airtable.uses_pkce());
        assert!(!Integration::Hubspot.uses_pkce());
        assert!(!Integration::Notion.uses_pkce());
    }

    #[test]
    fn test_build_hubspot_auth_url() {
        let url = test_config(Integration::Hubspot).build_auth_url("random_state", None);

        assert!(url.starts_with("https://app.hubspot.com/oauth/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8000%2Fintegrations%2Fhubspot%2Foauth2callback"
        ));
        // URL encoding converts spaces to %20
        assert!(url.contains("scope=crm.objects.contacts.read%20crm.objects.companies.read"));
        assert!(url.contains("state=random_state"));
        assert!(!url.contains("owner=user"));
        assert!(!url.contains("code_challenge"));
    }

    #[test]
    fn test_build_notion_auth_url_has_no_scope() {
        let url = test_config(Integration::Notion).build_auth_url("s", None);

        assert!(url.starts_with("https://api.notion.com/v1/oauth/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("owner=user"));
        assert!(!url.contains("scope="));
    }

    #[test]
    fn test_build_airtable_auth_url_with_challenge() {
        let url = test_config(Integration::Airtable).build_auth_url("s", Some("challenge123"));

        assert!(url.contains("code_challenge=challenge123"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("scope=data.records%3Aread"));
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = GatewayConfig::default();
        config.providers.insert(
            "hubspot".to_string(),
            ProviderSettings {
                client_id: Some("id".to_string()),
                client_secret: Some("secret".to_string()),
                ..Default::default()
            },
        );
        config.providers.insert(
            "notion".to_string(),
            ProviderSettings {
                client_id: Some("id".to_string()),
                ..Default::default()
            },
        );

        let registry = ProviderRegistry::from_config(&config).unwrap();

        let hubspot = registry.get(Integration::Hubspot).unwrap();
        assert_eq!(
            hubspot.redirect_uri,
            "http://localhost:8000/integrations/hubspot/oauth2callback"
        );
        assert_eq!(hubspot.scopes.len(), 4);
        assert_eq!(hubspot.token_url, "https://api.hubapi.com/oauth/v1/token");

        // Missing secret: not configured
        assert!(!registry.is_configured(Integration::Notion));
        assert!(matches!(
            registry.get(Integration::Notion),
            Err(OAuthError::NotConfigured(Integration::Notion))
        ));
    }

    #[test]
    fn test_registry_rejects_unknown_provider() {
        let mut config = GatewayConfig::default();
        config
            .providers
            .insert("salesforce".to_string(), ProviderSettings::default());

        let err = ProviderRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, OAuthError::UnsupportedIntegration(_)));
    }
}
