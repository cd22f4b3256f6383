use super::{AppError, AppState};
use crate::items::IntegrationItem;
use crate::oauth::{CallbackParams, Integration, OAuthError};
use axum::{
    extract::{Path, Query, State},
    response::{Html, Json},
    Form,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Closes the popup window the frontend opened for the provider's consent page.
const CLOSE_WINDOW_HTML: &str = "<html><script>window.close();</script></html>";

#[derive(Deserialize)]
pub struct IdentityForm {
    user_id: String,
    org_id: String,
}

#[derive(Deserialize)]
pub struct LoadForm {
    credentials: String,
}

/// POST /integrations/:name/authorize
///
/// Returns the provider authorization URL as a JSON string.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Form(form): Form<IdentityForm>,
) -> Result<Json<String>, AppError> {
    debug!(integration = %name, user_id = %form.user_id, org_id = %form.org_id, "Authorize requested");

    let url = state
        .flow
        .authorize(&name, &form.user_id, &form.org_id)
        .await?;
    Ok(Json(url))
}

/// GET /integrations/:name/oauth2callback
///
/// Provider redirect target. On success the popup closes itself; the frontend
/// then fetches the credentials.
pub async fn oauth2callback(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>, AppError> {
    debug!(integration = %name, "OAuth callback received");

    match state.flow.handle_callback(&name, params).await {
        Ok(identity) => {
            info!(
                integration = %name,
                user_id = %identity.user_id,
                org_id = %identity.org_id,
                "OAuth flow completed successfully"
            );
            Ok(Html(CLOSE_WINDOW_HTML))
        }
        Err(e) => {
            warn!(integration = %name, error = %e, "OAuth callback rejected");
            Err(e.into())
        }
    }
}

/// POST /integrations/:name/credentials
///
/// Single-use: a second call for the same user and org returns 400.
pub async fn credentials(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Form(form): Form<IdentityForm>,
) -> Result<Json<Value>, AppError> {
    let payload = state
        .flow
        .get_credentials(&name, &form.user_id, &form.org_id)
        .await?;
    Ok(Json(Value::Object(payload)))
}

/// POST /integrations/:name/load
///
/// `credentials` is the JSON payload previously returned by `/credentials`.
pub async fn load_items(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Form(form): Form<LoadForm>,
) -> Result<Json<Vec<IntegrationItem>>, AppError> {
    let integration: Integration = name.parse::<Integration>()?;

    let credentials = match serde_json::from_str::<Value>(&form.credentials) {
        Ok(Value::Object(map)) => map,
        _ => return Err(OAuthError::InvalidCredentialsFormat.into()),
    };
    let token = crate::items::access_token(&credentials).ok_or_else(|| {
        AppError::BadRequest("No access token found in credentials".to_string())
    })?;

    let items = state
        .loaders
        .load(integration, token)
        .await
        .map_err(|e| {
            error!(integration = %integration, error = %e, "Failed to load items");
            AppError::BadGateway(format!("Failed to retrieve items from {}: {}", integration, e))
        })?;

    Ok(Json(items))
}
