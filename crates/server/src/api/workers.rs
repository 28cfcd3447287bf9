//! Worker health API handlers.

use axum::{extract::State, Json};
use pizzeria_core::WorkerHealth;
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListWorkersResponse {
    pub workers: Vec<WorkerHealth>,
}

/// Every known worker with liveness judged now.
pub async fn list_workers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListWorkersResponse>, ApiError> {
    let workers = state.tracking().list_workers()?;
    Ok(Json(ListWorkersResponse { workers }))
}
