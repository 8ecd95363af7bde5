//! HTTP API for bot control, digit statistics, backtests, health and metrics.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
