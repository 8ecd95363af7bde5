//! AI strategy backtest.
//!
//! Sends a free-text strategy and a fixed OHLC history to a hosted language
//! model through an OpenAI-compatible chat completions endpoint, and returns
//! its two narrative fields. Nothing is simulated locally; the reply is only
//! checked against the expected shape.

use std::time::{Duration, Instant};

use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::AiError;
use crate::metrics;

const DEFAULT_MAX_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str = "You are an expert trading strategy analyst for synthetic indices. \
Reply with a single JSON object with exactly two string fields: \
\"winLossProjection\" and \"strategyInsights\". Do not wrap it in markdown.";

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// One OHLC bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar date.
    pub date: String,
    /// Open.
    pub open: Decimal,
    /// High.
    pub high: Decimal,
    /// Low.
    pub low: Decimal,
    /// Close.
    pub close: Decimal,
}

/// Fixed mock history sent with every backtest.
pub fn mock_history() -> Vec<Candle> {
    let bars = [
        ("2024-01-01", dec!(100.00), dec!(102.50), dec!(99.10), dec!(101.80)),
        ("2024-01-02", dec!(101.80), dec!(103.20), dec!(100.40), dec!(100.90)),
        ("2024-01-03", dec!(100.90), dec!(101.70), dec!(98.60), dec!(99.20)),
        ("2024-01-04", dec!(99.20), dec!(100.80), dec!(97.90), dec!(100.50)),
        ("2024-01-05", dec!(100.50), dec!(104.10), dec!(100.20), dec!(103.70)),
        ("2024-01-06", dec!(103.70), dec!(105.30), dec!(102.80), dec!(104.60)),
        ("2024-01-07", dec!(104.60), dec!(104.90), dec!(101.30), dec!(101.90)),
        ("2024-01-08", dec!(101.90), dec!(103.40), dec!(101.10), dec!(102.70)),
        ("2024-01-09", dec!(102.70), dec!(106.00), dec!(102.20), dec!(105.40)),
        ("2024-01-10", dec!(105.40), dec!(106.80), dec!(103.90), dec!(104.30)),
    ];

    bars.into_iter()
        .map(|(date, open, high, low, close)| Candle {
            date: date.to_string(),
            open,
            high,
            low,
            close,
        })
        .collect()
}

/// Backtest input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
    /// Free-text strategy description.
    pub trading_strategy: String,
    /// Historical data as a JSON string.
    pub historical_data: String,
}

impl BacktestRequest {
    /// Request with the fixed mock history.
    pub fn with_mock_history(trading_strategy: impl Into<String>) -> Result<Self, AiError> {
        let historical_data = serde_json::to_string(&mock_history())
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        Ok(Self {
            trading_strategy: trading_strategy.into(),
            historical_data,
        })
    }

    /// Render the user prompt.
    pub fn prompt(&self) -> String {
        format!(
            "Backtest the following trading strategy against the historical data.\n\n\
             Trading strategy:\n{}\n\n\
             Historical data (JSON):\n{}\n\n\
             Provide a projected win/loss ratio with reasoning in \"winLossProjection\", \
             and strengths, weaknesses and suggested improvements in \"strategyInsights\".",
            self.trading_strategy.trim(),
            self.historical_data
        )
    }
}

/// Backtest output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    /// Projected win/loss ratio, narrative.
    pub win_loss_projection: String,
    /// Strategy insights, narrative.
    pub strategy_insights: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    #[serde(default)]
    win_loss_projection: Option<String>,
    #[serde(default)]
    strategy_insights: Option<String>,
}

/// Validate model output against the report schema.
pub fn parse_report(content: &str) -> Result<BacktestReport, AiError> {
    let json = strip_code_fence(content);
    let raw: RawReport = serde_json::from_str(json).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

    let field = |value: Option<String>, name: &str| -> Result<String, AiError> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AiError::InvalidResponse(format!("missing {name}")))
    };

    Ok(BacktestReport {
        win_loss_projection: field(raw.win_loss_projection, "winLossProjection")?,
        strategy_insights: field(raw.strategy_insights, "strategyInsights")?,
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the hosted model.
#[derive(Debug, Clone)]
pub struct BacktestClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl BacktestClient {
    /// Build from application configuration.
    pub fn new(config: &Config) -> Result<Self, AiError> {
        let api_key = config
            .ai_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AiError::MissingApiKey)?;
        Self::from_parts(&config.ai_api_url, &api_key, &config.ai_model, Duration::from_secs(config.ai_timeout_s))
    }

    /// Build from explicit parts.
    pub fn from_parts(api_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self, AiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one backtest. No retry.
    #[instrument(skip(self, request), fields(model = %self.model))]
    pub async fn run(&self, request: &BacktestRequest) -> Result<BacktestReport, AiError> {
        if request.trading_strategy.trim().is_empty() {
            return Err(AiError::EmptyStrategy);
        }

        let body = ChatRequest {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt(),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let start = Instant::now();
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;
        metrics::record_ai_request_latency(start);
        let response = response?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| AiError::InvalidResponse("no choices in response".to_string()))?;

        debug!(chars = content.len(), "Model replied");
        let report = parse_report(&content)?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "Backtest complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_history_is_fixed() {
        let history = mock_history();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].open, dec!(100.00));
        assert!(history.iter().all(|c| c.low <= c.open && c.open <= c.high));
        assert!(history.iter().all(|c| c.low <= c.close && c.close <= c.high));
    }

    #[test]
    fn prompt_includes_strategy_and_history() {
        let request = BacktestRequest::with_mock_history("Buy DIGITOVER 4 after three unders").unwrap();
        let prompt = request.prompt();
        assert!(prompt.contains("Buy DIGITOVER 4 after three unders"));
        assert!(prompt.contains("2024-01-10"));
    }

    #[test]
    fn request_serializes_camel_case() {
        let request = BacktestRequest {
            trading_strategy: "s".to_string(),
            historical_data: "[]".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"tradingStrategy": "s", "historicalData": "[]"}));
    }

    #[test]
    fn parses_plain_and_fenced_reports() {
        let plain = r#"{"winLossProjection":"55/45","strategyInsights":"Too aggressive"}"#;
        let fenced = format!("```json\n{plain}\n```");

        let expected = BacktestReport {
            win_loss_projection: "55/45".to_string(),
            strategy_insights: "Too aggressive".to_string(),
        };
        assert_eq!(parse_report(plain).unwrap(), expected);
        assert_eq!(parse_report(&fenced).unwrap(), expected);
    }

    #[test]
    fn rejects_missing_or_blank_fields() {
        assert!(parse_report(r#"{"winLossProjection":"55/45"}"#).is_err());
        assert!(parse_report(r#"{"winLossProjection":" ","strategyInsights":"x"}"#).is_err());
        assert!(parse_report("I think it will win").is_err());
    }

    #[test]
    fn client_requires_api_key() {
        let config = Config::default();
        assert!(matches!(BacktestClient::new(&config), Err(AiError::MissingApiKey)));
    }

    #[tokio::test]
    async fn empty_strategy_rejected_before_request() {
        let client = BacktestClient::from_parts("http://127.0.0.1:9/never", "k", "m", Duration::from_secs(1)).unwrap();
        let request = BacktestRequest::with_mock_history("   ").unwrap();
        assert!(matches!(client.run(&request).await, Err(AiError::EmptyStrategy)));
    }
}
