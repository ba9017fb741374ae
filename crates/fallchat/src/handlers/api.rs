//! Catalog, probe and health handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::response;
use crate::server::AppState;

#[derive(Serialize)]
pub struct RefreshResponse {
    working_providers: Vec<String>,
    total_providers: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    providers_count: usize,
    models_count: usize,
    working_providers: Vec<String>,
    working_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_probe: Option<DateTime<Utc>>,
}

/// GET /api/providers
pub async fn list_providers(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.catalog.providers_by_id())).into_response()
}

/// GET /api/models
pub async fn list_models(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.catalog.models_by_id())).into_response()
}

/// POST /api/refresh-providers
///
/// Runs a full probe before answering, so this can take up to the probe timeout.
pub async fn refresh_providers(State(state): State<AppState>) -> Response {
    let set = state.probe.probe().await;
    let body = RefreshResponse {
        working_providers: set.providers().to_vec(),
        total_providers: state.catalog.providers().len(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Response {
    let set = state.probe.snapshot().await;
    let body = HealthResponse {
        status: "healthy",
        providers_count: state.catalog.providers().len(),
        models_count: state.catalog.models().len(),
        working_providers: set.providers().to_vec(),
        working_count: set.len(),
        last_probe: set.probed_at(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    response::not_found("Not found").into_response()
}
