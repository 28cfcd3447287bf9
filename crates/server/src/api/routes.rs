use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{metrics_middleware, request_id_middleware};
use super::{handlers, orders, workers};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Orders
        .route("/orders", get(orders::list_orders).post(orders::place_order))
        .route(
            "/orders/{id}",
            get(orders::get_order).delete(orders::cancel_order),
        )
        .route("/orders/{id}/history", get(orders::get_order_history))
        .route("/orders/number/{number}", get(orders::get_order_by_number))
        // Workers
        .route("/workers", get(workers::list_workers));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
}
