pub mod env;
pub use env::{apply_env_overrides, apply_overrides_from};

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;

/// Upper bound for state and credential TTLs (one day).
const MAX_TTL_SECONDS: i64 = 86_400;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub store: StoreConfig,
    /// `[providers.<name>]` tables, keyed by integration name
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Externally visible base URL, used for default redirect URIs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: default_public_base_url(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// OAuth flow timing
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSettings {
    /// How long an authorization attempt stays valid (seconds)
    #[serde(default = "default_state_expiration")]
    pub state_token_expiration_seconds: i64,
    /// How long an unread credential payload is kept (seconds)
    #[serde(default = "default_credential_ttl")]
    pub credential_ttl_seconds: i64,
    /// Request timeout for provider HTTP calls (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_state_expiration() -> i64 {
    300
}

fn default_credential_ttl() -> i64 {
    600
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            state_token_expiration_seconds: default_state_expiration(),
            credential_ttl_seconds: default_credential_ttl(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

/// In-memory store maintenance
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

/// Client registration for one integration. Anything left out falls back to
/// the integration's built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub token_url: Option<String>,
}

impl GatewayConfig {
    /// Reject values that would make every flow fail at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_TTL_SECONDS).contains(&self.oauth.state_token_expiration_seconds),
            "oauth.state_token_expiration_seconds must be between 1 and {}",
            MAX_TTL_SECONDS
        );
        anyhow::ensure!(
            (1..=MAX_TTL_SECONDS).contains(&self.oauth.credential_ttl_seconds),
            "oauth.credential_ttl_seconds must be between 1 and {}",
            MAX_TTL_SECONDS
        );
        anyhow::ensure!(
            self.store.sweep_interval_seconds > 0,
            "store.sweep_interval_seconds must be positive"
        );
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> anyhow::Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: GatewayConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    config.validate()?;
    Ok(config)
}
