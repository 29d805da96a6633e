pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    routing::{get, post},
};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/orders", get(handlers::list_orders))
        .route("/api/v1/orders/stats", get(handlers::order_stats))
        .route("/api/v1/orders/{id}", get(handlers::get_order))
        .route(
            "/api/v1/orders/{id}/status",
            post(handlers::update_order_status),
        )
        .route(
            "/api/v1/customers/{customer_id}/orders",
            get(handlers::customer_orders),
        )
        .route("/api/v1/order-statuses", get(handlers::list_statuses))
        .route("/health/db", get(handlers::db_health))
        .with_state(state)
}
