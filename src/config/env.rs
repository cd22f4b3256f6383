use super::GatewayConfig;
use crate::oauth::Integration;

/// Apply `GATEWAY_*` environment variables on top of the file configuration.
///
/// For each integration `<NAME>`: `GATEWAY_<NAME>_CLIENT_ID`,
/// `GATEWAY_<NAME>_CLIENT_SECRET`, `GATEWAY_<NAME>_REDIRECT_URI`.
/// `GATEWAY_BIND_ADDR` and `GATEWAY_PUBLIC_BASE_URL` override `[server]`.
pub fn apply_env_overrides(config: &mut GatewayConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with an explicit variable source.
pub fn apply_overrides_from(config: &mut GatewayConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("GATEWAY_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = lookup("GATEWAY_PUBLIC_BASE_URL") {
        config.server.public_base_url = v;
    }

    for integration in Integration::ALL {
        let prefix = format!("GATEWAY_{}", integration.as_str().to_uppercase());
        let client_id = lookup(&format!("{}_CLIENT_ID", prefix));
        let client_secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
        let redirect_uri = lookup(&format!("{}_REDIRECT_URI", prefix));

        if client_id.is_none() && client_secret.is_none() && redirect_uri.is_none() {
            continue;
        }

        let settings = config
            .providers
            .entry(integration.as_str().to_string())
            .or_default();
        if client_id.is_some() {
            settings.client_id = client_id;
        }
        if client_secret.is_some() {
            settings.client_secret = client_secret;
        }
        if redirect_uri.is_some() {
            settings.redirect_uri = redirect_uri;
        }
    }
}
