//! Run API endpoints.
//!
//! Creating a Run is the only inbound write; status is owned by the
//! controller and exposed read-only.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use runrelay_reconcile::{Run, RunKey, RunSpec};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Create run routes, nested at /v1/runs.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_runs).post(create_run))
        .route("/{namespace}/{name}", get(get_run))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to create a Run.
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateRunRequest {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: RunSpec,
}

/// Response for listing Runs.
#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub items: Vec<Run>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a Run. Its status starts out pending.
///
/// POST /v1/runs
async fn create_run(
    State(state): State<AppState>,
    body: Result<Json<CreateRunRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;

    let key = RunKey::new(req.namespace, req.name)
        .map_err(|e| ApiError::bad_request("invalid_run_key", e.to_string()))?;

    let run = state.store().create(Run::new(key, req.spec)).await?;
    info!(run = %run.key, "Run created via API");

    Ok((StatusCode::CREATED, Json(run)))
}

/// List all Runs in key order.
///
/// GET /v1/runs
async fn list_runs(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let items = state.store().list().await?;
    Ok(Json(ListRunsResponse { items }))
}

/// Get a Run by namespace and name.
///
/// GET /v1/runs/{namespace}/{name}
async fn get_run(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = RunKey::new(namespace, name)
        .map_err(|e| ApiError::bad_request("invalid_run_key", e.to_string()))?;

    match state.store().get(&key).await? {
        Some(run) => Ok(Json(run)),
        None => Err(ApiError::not_found(
            "run_not_found",
            format!("Run {key} not found"),
        )),
    }
}
