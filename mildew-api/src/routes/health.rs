/// Liveness and health endpoints
///
/// ```text
/// GET /ping     -> {"message": "pong"}
/// GET /health   -> {"status": "healthy", "version": "0.1.0",
///                   "database": "connected", "detector": "mock"}
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use mildew_shared::db::pool::health_check as db_health_check;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    /// Application version
    pub version: String,

    /// `connected` or `disconnected`
    pub database: String,

    /// Detector backend in use, `none` if no detectors are loaded
    pub detector: String,
}

pub async fn ping() -> Json<JsonValue> {
    Json(json!({ "message": "pong" }))
}

/// Reports database connectivity and the detector backend
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let connected = db_health_check(&state.db).await.is_ok();
    let detector = state
        .detectors
        .backend()
        .map(|b| b.to_string())
        .unwrap_or_else(|| "none".to_string());

    let healthy = connected && !state.detectors.is_empty();

    Ok(Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        detector,
    }))
}
