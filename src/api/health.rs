//! Health check endpoint.

use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use crate::store::StoreBackend;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/healthy", get(healthy))
}

#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: &'static str,
}

#[utoipa::path(
    get,
    path = "/healthy",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Server and store are healthy"),
        (status = 503, description = "Store is unreachable"),
    )
)]
async fn healthy(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response(),
        Err(error) => {
            log::error!("health check failed: {error}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "error": error })),
            )
                .into_response()
        }
    }
}
