use super::AppError;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /healthcheck
pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Log entry shipped by the frontend.
#[derive(Debug, Deserialize)]
pub struct LogEntry {
    timestamp: String,
    level: String,
    component: String,
    action: String,
    details: Option<Value>,
    metadata: Option<Value>,
}

/// POST /logs
///
/// Re-emits a frontend log entry through `tracing` at its own level.
pub async fn store_log(Json(entry): Json<LogEntry>) -> Result<Json<Value>, AppError> {
    let timestamp = DateTime::parse_from_rfc3339(&entry.timestamp)
        .map_err(|e| AppError::BadRequest(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc);

    let details = entry.details.unwrap_or_else(|| json!({}));
    let metadata = entry.metadata.unwrap_or_else(|| json!({}));

    match entry.level.to_ascii_uppercase().as_str() {
        "ERROR" => error!(target: "frontend", %timestamp, component = %entry.component, action = %entry.action, %details, %metadata, "[Frontend]"),
        "WARN" | "WARNING" => warn!(target: "frontend", %timestamp, component = %entry.component, action = %entry.action, %details, %metadata, "[Frontend]"),
        "DEBUG" => debug!(target: "frontend", %timestamp, component = %entry.component, action = %entry.action, %details, %metadata, "[Frontend]"),
        _ => info!(target: "frontend", %timestamp, component = %entry.component, action = %entry.action, %details, %metadata, "[Frontend]"),
    }

    Ok(Json(json!({
        "status": "success",
        "message": "Log stored successfully",
    })))
}
