//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,

    pub service: String,

    pub version: String,

    /// Current timestamp (RFC 3339).
    pub timestamp: String,

    /// Store status, on readiness checks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

impl HealthResponse {
    fn new(status: &str, store: Option<String>) -> Self {
        Self {
            status: status.to_string(),
            service: "run-controller".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339(),
            store,
        }
    }
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

/// Liveness: returns 200 while the server is up.
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse::new("ok", None))
}

/// Readiness: returns 503 if the store cannot be read.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store().list().await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse::new("ok", Some("ok".to_string()))),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::new("degraded", Some(e.to_string()))),
        ),
    }
}
