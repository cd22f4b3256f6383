use anyhow::{Context, Result};
use integration_gateway::api::{cors_layer, create_router, AppState};
use integration_gateway::config::{apply_env_overrides, load_config, GatewayConfig};
use integration_gateway::items::ItemLoaders;
use integration_gateway::oauth::{Integration, OAuthFlow, ProviderRegistry};
use integration_gateway::store::{run_expiry_sweep, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "integration_gateway=info".into()),
        )
        .init();

    info!("Integration gateway starting...");

    let mut config = match std::env::var("GATEWAY_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration");
            load_config(&path)?
        }
        Err(_) => {
            info!("GATEWAY_CONFIG not set, using defaults");
            GatewayConfig::default()
        }
    };
    apply_env_overrides(&mut config);
    config.validate()?;

    let providers = Arc::new(
        ProviderRegistry::from_config(&config).context("Invalid [providers] configuration")?,
    );
    for integration in Integration::ALL {
        if providers.is_configured(integration) {
            info!(integration = %integration, "OAuth provider configured");
        } else {
            warn!(
                integration = %integration,
                "OAuth provider not configured. Set GATEWAY_{}_CLIENT_ID and GATEWAY_{}_CLIENT_SECRET",
                integration.as_str().to_uppercase(),
                integration.as_str().to_uppercase()
            );
        }
    }

    // Provider calls are bounded by the client timeout
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.oauth.http_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let store = Arc::new(MemoryStore::new());
    tokio::spawn(run_expiry_sweep(
        store.clone(),
        config.store.sweep_interval_seconds,
    ));

    let state = AppState {
        flow: OAuthFlow::new(store, providers, http_client.clone(), &config.oauth),
        loaders: ItemLoaders::new(http_client),
    };
    let app = create_router(state).layer(cors_layer(&config.server.cors_origins)?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Integration gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
