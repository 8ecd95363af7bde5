//! Unified error types for the digit bot.

use serde::Serialize;
use thiserror::Error;

/// Unified error type for the digit bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Environment configuration loading error.
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),

    /// Bot configuration failed validation.
    #[error("invalid bot configuration: {0}")]
    Config(#[from] ConfigError),

    /// Execution loop error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// AI backtest error.
    #[error("ai backtest error: {0}")]
    Ai(#[from] AiError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single rejected form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name as submitted.
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Bot configuration validation errors, reported per field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} field(s) rejected: {}", .errors.len(), summarize(.errors))]
pub struct ConfigError {
    /// All rejected fields.
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by the execution loop itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Run state can only be cleared while idle or stopped.
    #[error("cannot clear run state while the bot is running")]
    ClearWhileRunning,

    /// The driver task is gone.
    #[error("bot driver is not available")]
    DriverUnavailable,
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// No live connection to send on.
    #[error("not connected")]
    NotConnected,

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Invalid endpoint URL.
    #[error("invalid websocket url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// AI backtest service errors.
#[derive(Error, Debug)]
pub enum AiError {
    /// No API key configured.
    #[error("AI_API_KEY is not configured")]
    MissingApiKey,

    /// Strategy text was empty.
    #[error("trading strategy must not be empty")]
    EmptyStrategy,

    /// Transport failure.
    #[error("request to AI service failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("AI service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Response did not match the expected schema.
    #[error("AI response rejected: {0}")]
    InvalidResponse(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
