//! Order intake and tracking API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use pizzeria_core::{
    Order, OrderDetails, OrderFilter, OrderPage, OrderRef, OrderStatus, OrderType, OrderView,
    PlaceOrderRequest, StatusLogEntry, INTAKE_ACTOR,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use super::middleware::RequestId;
use crate::state::AppState;

/// Maximum allowed limit for order queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for order queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    /// Filter by status (e.g. "preparing")
    pub status: Option<String>,
    /// Filter by order type ("dine_in" or "delivery")
    pub order_type: Option<String>,
    /// Filter by the worker holding or last holding the order
    pub processed_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for cancelling an order
#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderBody {
    pub reason: Option<String>,
    /// Recorded as `changed_by` on the log entry.
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderHistoryResponse {
    pub order_ref: OrderRef,
    pub history: Vec<StatusLogEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Place a new order
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    body: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderDetails>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::validation(e.body_text()))?;

    let details = state.intake().place_order(request, Some(request_id)).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// Get an order by id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.tracking().get_order(OrderRef::Id(id))?))
}

/// Get an order by its human-facing number
pub async fn get_order_by_number(
    State(state): State<Arc<AppState>>,
    Path(number): Path<i64>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.tracking().get_order(OrderRef::Number(number))?))
}

/// Status log of an order, oldest first
pub async fn get_order_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderHistoryResponse>, ApiError> {
    let order_ref = OrderRef::Id(id);
    let history = state.tracking().history(order_ref)?;
    Ok(Json(OrderHistoryResponse { order_ref, history }))
}

/// List orders with optional filters
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderPage>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = OrderFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        filter = filter.with_status(status);
    }

    if let Some(ref order_type) = params.order_type {
        let order_type = order_type
            .parse::<OrderType>()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        filter = filter.with_order_type(order_type);
    }

    if let Some(ref worker) = params.processed_by {
        filter = filter.with_processed_by(worker);
    }

    Ok(Json(state.tracking().list_orders(&filter)?))
}

/// Cancel an order (DELETE endpoint)
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    RequestId(request_id): RequestId,
    Path(id): Path<i64>,
    body: Option<Json<CancelOrderBody>>,
) -> Result<Json<Order>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let actor = body.cancelled_by.as_deref().unwrap_or(INTAKE_ACTOR);

    let order = state
        .intake()
        .cancel_order(id, actor, body.reason.as_deref(), Some(request_id))
        .await?;
    Ok(Json(order))
}
