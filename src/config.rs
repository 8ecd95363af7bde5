//! Application configuration loaded from environment variables.

use serde::Deserialize;

/// Largest digit window the statistics panel keeps.
pub const MAX_DIGIT_WINDOW: usize = 1000;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Brokerage Connection ===
    /// Registered application id appended to the WebSocket URL.
    #[serde(default = "default_app_id")]
    pub deriv_app_id: String,

    /// API token used to authorize the session.
    #[serde(default)]
    pub deriv_api_token: Option<String>,

    /// WebSocket endpoint without query string.
    #[serde(default = "default_ws_url")]
    pub deriv_ws_url: String,

    /// Market whose ticks feed the digit statistics.
    #[serde(default = "default_tick_symbol")]
    pub tick_symbol: String,

    /// Number of recent ticks kept for digit statistics.
    #[serde(default = "default_digit_window")]
    pub digit_window: usize,

    /// Keep-alive ping interval in seconds.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_s: u64,

    /// Maximum reconnect backoff in seconds.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_delay_s: u64,

    // === AI Backtest ===
    /// API key for the hosted language model.
    #[serde(default)]
    pub ai_api_key: Option<String>,

    /// Chat completions endpoint.
    #[serde(default = "default_ai_url")]
    pub ai_api_url: String,

    /// Model identifier.
    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_s: u64,

    // === Server Configuration ===
    /// HTTP server port for the control API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Log output format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_app_id() -> String {
    "1089".to_string()
}

fn default_ws_url() -> String {
    "wss://ws.derivws.com/websockets/v3".to_string()
}

fn default_tick_symbol() -> String {
    "R_100".to_string()
}

fn default_digit_window() -> usize {
    MAX_DIGIT_WINDOW
}

fn default_heartbeat() -> u64 {
    30
}

fn default_reconnect_max() -> u64 {
    30
}

fn default_ai_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deriv_app_id: default_app_id(),
            deriv_api_token: None,
            deriv_ws_url: default_ws_url(),
            tick_symbol: default_tick_symbol(),
            digit_window: default_digit_window(),
            heartbeat_interval_s: default_heartbeat(),
            reconnect_max_delay_s: default_reconnect_max(),
            ai_api_key: None,
            ai_api_url: default_ai_url(),
            ai_model: default_ai_model(),
            ai_timeout_s: default_ai_timeout(),
            port: default_port(),
            rust_log: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.deriv_app_id.trim().is_empty() || !self.deriv_app_id.chars().all(|c| c.is_ascii_digit()) {
            return Err("DERIV_APP_ID must be numeric".to_string());
        }

        if !(self.deriv_ws_url.starts_with("wss://") || self.deriv_ws_url.starts_with("ws://")) {
            return Err("DERIV_WS_URL must start with ws:// or wss://".to_string());
        }

        if self.tick_symbol.trim().is_empty() {
            return Err("TICK_SYMBOL is required".to_string());
        }

        if self.digit_window == 0 || self.digit_window > MAX_DIGIT_WINDOW {
            return Err(format!("DIGIT_WINDOW must be between 1 and {MAX_DIGIT_WINDOW}"));
        }

        if self.heartbeat_interval_s == 0 {
            return Err("HEARTBEAT_INTERVAL_S must be at least 1".to_string());
        }

        if !self.ai_api_url.starts_with("http://") && !self.ai_api_url.starts_with("https://") {
            return Err("AI_API_URL must be an http(s) URL".to_string());
        }

        match self.log_format.as_str() {
            "text" | "json" => {}
            other => return Err(format!("LOG_FORMAT must be text or json, got {other}")),
        }

        Ok(())
    }

    /// Whether an API token is available for trading.
    pub fn can_trade(&self) -> bool {
        self.deriv_api_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Whether logs should be emitted as JSON.
    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}
