//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use saga_store::SagaStore;
use serde::Serialize;

use super::sagas::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub runtime: &'static str,
}

/// GET /health: 503 once the saga runtime has stopped accepting messages.
pub async fn check<S: SagaStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    if state.runtime.is_closed() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                runtime: "stopped",
            }),
        )
    } else {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                runtime: "running",
            }),
        )
    }
}
