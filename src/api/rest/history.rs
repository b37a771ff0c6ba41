//! History endpoint - latest entries for polling clients

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{de, Deserialize, Deserializer};

use super::ApiError;
use crate::api::websocket::state::AppState;
use crate::types::HistoryEntry;

/// Query parameters for GET /history
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Maximum number of entries (default: 50, max: 1000)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<i64>,
}

/// `?limit=` with no value falls back to the default, like an absent `limit`
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map(Some).map_err(de::Error::custom)
        }
        _ => Ok(None),
    }
}

/// GET /history - Most recent entries, newest first
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let Query(params) = params.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let entries = state.query.latest(params.limit).await?;
    Ok(Json(entries))
}
