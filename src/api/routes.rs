//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    backtest, clear_bot, digits, health, metrics, ready, start_bot, status, stop_bot, AppState,
};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Bot control
        .route("/api/v1/status", get(status))
        .route("/api/v1/bot/start", post(start_bot))
        .route("/api/v1/bot/stop", post(stop_bot))
        .route("/api/v1/bot/clear", post(clear_bot))
        // Analytics
        .route("/api/v1/digits", get(digits))
        .route("/api/v1/backtest", post(backtest))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
