//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::ai::{BacktestClient, BacktestRequest};
use crate::bot::{BotConfiguration, BotHandle, SharedView, StartOutcome};
use crate::error::{AiError, EngineError, FieldError};

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Whether the broker connection is live.
    pub connected: Arc<AtomicBool>,
    /// Control channel to the bot driver.
    pub bot: BotHandle,
    /// Published bot view and digit window.
    pub view: SharedView,
    /// AI backtest client, if configured.
    pub backtest: Option<Arc<BacktestClient>>,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(bot: BotHandle, view: SharedView, connected: Arc<AtomicBool>) -> Self {
        Self {
            connected,
            bot,
            view,
            backtest: None,
            metrics: None,
        }
    }

    /// Attach an AI backtest client.
    pub fn with_backtest(mut self, client: BacktestClient) -> Self {
        self.backtest = Some(Arc::new(client));
        self
    }

    /// Attach a Prometheus handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Check if the broker connection is live.
    pub fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// API error response.
#[derive(Debug)]
pub enum ApiError {
    /// Form validation failed.
    Validation(Vec<FieldError>),
    /// Request conflicts with the bot's state.
    Conflict(String),
    /// A dependency is unavailable.
    Unavailable(String),
    /// The request itself was malformed.
    BadRequest(String),
    /// The upstream AI service failed.
    Upstream(String),
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Per-field errors, for validation failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, fields) = match self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "invalid bot configuration".to_string(),
                fields,
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, Vec::new()),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, Vec::new()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Vec::new()),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg, Vec::new()),
        };
        (status, Json(ErrorResponse { error, fields })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::ClearWhileRunning => ApiError::Conflict(e.to_string()),
            EngineError::DriverUnavailable => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::EmptyStrategy => ApiError::BadRequest(e.to_string()),
            AiError::MissingApiKey => ApiError::Unavailable(e.to_string()),
            other => {
                error!(error = %other, "Backtest failed");
                ApiError::Upstream(other.to_string())
            }
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the broker connection is live.
    pub ready: bool,
}

/// Stop response.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Whether this call stopped a running bot.
    pub stopped: bool,
}

/// Backtest request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestBody {
    /// Free-text strategy description.
    pub trading_strategy: String,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if connected, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

/// Status handler - returns the published bot view.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.view.bot.read().await.clone();
    Json(view)
}

/// Start the bot with a configuration snapshot.
pub async fn start_bot(
    State(state): State<AppState>,
    Json(config): Json<BotConfiguration>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .bot
        .start(config)
        .await?
        .map_err(|e| ApiError::Validation(e.errors))?;

    let status = match outcome {
        StartOutcome::Started { .. } => StatusCode::OK,
        StartOutcome::AlreadyRunning => StatusCode::CONFLICT,
        StartOutcome::NotConnected => {
            warn!("Start requested while disconnected");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    Ok((status, Json(outcome)))
}

/// Stop the bot.
pub async fn stop_bot(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stopped = state.bot.stop().await?;
    Ok(Json(StopResponse { stopped }))
}

/// Clear run state.
pub async fn clear_bot(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.bot.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Digit statistics for the current window.
pub async fn digits(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.view.digits.read().await.stats();
    Json(stats)
}

/// Run an AI backtest against the fixed mock history.
pub async fn backtest(
    State(state): State<AppState>,
    Json(body): Json<BacktestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .backtest
        .clone()
        .ok_or(AiError::MissingApiKey)?;

    let request = BacktestRequest::with_mock_history(body.trading_strategy)?;
    let report = client.run(&request).await?;
    Ok(Json(report))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
