//! Router configuration for the HTTP API.

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/predict/hourly/{horizon}", get(handlers::predict_hourly))
        .route("/predict/daily/{horizon}", get(handlers::predict_daily))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
