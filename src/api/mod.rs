//! HTTP API for the frontend.
//!
//! Routes, per integration `:name`:
//! - POST /integrations/:name/authorize       (form: user_id, org_id)
//! - GET  /integrations/:name/oauth2callback  (provider redirect)
//! - POST /integrations/:name/credentials     (form: user_id, org_id)
//! - POST /integrations/:name/load            (form: credentials)
//!
//! Plus GET /, GET /healthcheck and POST /logs.

mod health;
mod integrations;

use crate::items::ItemLoaders;
use crate::oauth::{OAuthError, OAuthFlow};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub flow: OAuthFlow,
    pub loaders: ItemLoaders,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for API endpoints
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
    /// Provider's own status, passed through
    Upstream(StatusCode, String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Upstream(status, msg) => (status, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<OAuthError> for AppError {
    fn from(e: OAuthError) -> Self {
        let message = e.to_string();
        match e {
            OAuthError::InvalidStateFormat
            | OAuthError::MissingStateFields
            | OAuthError::StateMismatch
            | OAuthError::ProviderDenied { .. }
            | OAuthError::MissingCallbackParams
            | OAuthError::CredentialsNotFound
            | OAuthError::InvalidCredentialsFormat => AppError::BadRequest(message),
            OAuthError::UnsupportedIntegration(_) => AppError::NotFound(message),
            OAuthError::TokenExchangeFailed { status, .. } => {
                match StatusCode::from_u16(status) {
                    Ok(code) if code.is_client_error() || code.is_server_error() => {
                        AppError::Upstream(code, message)
                    }
                    _ => AppError::BadGateway(message),
                }
            }
            OAuthError::Transport(_) => AppError::BadGateway(message),
            OAuthError::NotConfigured(_) | OAuthError::Store(_) => {
                error!(error = %message, "Gateway misconfigured or store unavailable");
                AppError::ServerError(message)
            }
        }
    }
}

/// Create the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/healthcheck", get(health::healthcheck))
        .route("/logs", post(health::store_log))
        .route(
            "/integrations/:name/authorize",
            post(integrations::authorize),
        )
        .route(
            "/integrations/:name/oauth2callback",
            get(integrations::oauth2callback),
        )
        .route(
            "/integrations/:name/credentials",
            post(integrations::credentials),
        )
        .route("/integrations/:name/load", post(integrations::load_items))
        .with_state(Arc::new(state))
}

/// CORS policy for the configured frontend origins.
pub fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| anyhow::anyhow!("Invalid CORS origin {:?}: {}", o, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::Integration;
    use crate::store::StoreError;

    fn status_of(e: OAuthError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn test_oauth_error_status_mapping() {
        assert_eq!(status_of(OAuthError::StateMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(OAuthError::InvalidStateFormat), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(OAuthError::CredentialsNotFound), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(OAuthError::UnsupportedIntegration("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OAuthError::NotConfigured(Integration::Notion)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(OAuthError::Store(StoreError::Unavailable("down".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_exchange_failure_keeps_upstream_status() {
        let upstream = OAuthError::TokenExchangeFailed {
            status: 401,
            body: "invalid_client".to_string(),
        };
        assert_eq!(status_of(upstream), StatusCode::UNAUTHORIZED);

        let odd = OAuthError::TokenExchangeFailed {
            status: 200,
            body: "not json".to_string(),
        };
        assert_eq!(status_of(odd), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }
}
