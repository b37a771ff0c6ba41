//! Health endpoint

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::ApiError;
use crate::api::websocket::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub entries: u64,
    pub connections: usize,
}

/// GET /health - 503 when the store cannot be reached
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let entries = state.store().count().await.map_err(|err| {
        tracing::warn!(error = %err, "health check could not reach the store");
        ApiError::unavailable("store unreachable")
    })?;

    Ok(Json(HealthResponse {
        status: "ok",
        entries,
        connections: state.broadcaster.connection_count(),
    }))
}
