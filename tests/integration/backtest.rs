//! Backtest client against a local chat-completions server.

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use digit_bot::ai::{BacktestClient, BacktestRequest};
use digit_bot::error::AiError;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1/chat/completions")
}

async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }

    let prompt = body["messages"][1]["content"].as_str().unwrap_or_default();
    assert!(prompt.contains("Bet DIGITEVEN after two odd digits"));
    assert!(prompt.contains("2024-01-01"));
    assert_eq!(body["response_format"]["type"], "json_object");

    let content = json!({
        "winLossProjection": "Roughly 52% wins over the sample.",
        "strategyInsights": "Entry signal is noise on a synthetic index."
    })
    .to_string();

    (
        StatusCode::OK,
        Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]})),
    )
}

fn client(url: &str, key: &str) -> BacktestClient {
    BacktestClient::from_parts(url, key, "test-model", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn backtest_returns_both_fields() {
    let url = serve(Router::new().route("/v1/chat/completions", post(completions))).await;
    let request = BacktestRequest::with_mock_history("Bet DIGITEVEN after two odd digits").unwrap();

    let report = client(&url, "test-key").run(&request).await.unwrap();

    assert_eq!(report.win_loss_projection, "Roughly 52% wins over the sample.");
    assert_eq!(report.strategy_insights, "Entry signal is noise on a synthetic index.");
}

#[tokio::test]
async fn rejected_key_surfaces_status() {
    let url = serve(Router::new().route("/v1/chat/completions", post(completions))).await;
    let request = BacktestRequest::with_mock_history("Bet DIGITEVEN after two odd digits").unwrap();

    let err = client(&url, "wrong-key").run(&request).await.unwrap_err();

    assert!(matches!(err, AiError::Status { status: 401, .. }));
}

#[tokio::test]
async fn malformed_model_reply_is_rejected() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({"choices": [{"message": {"role": "assistant", "content": "Looks profitable!"}}]}))
        }),
    );
    let url = serve(router).await;
    let request = BacktestRequest::with_mock_history("anything").unwrap();

    let err = client(&url, "test-key").run(&request).await.unwrap_err();

    assert!(matches!(err, AiError::InvalidResponse(_)));
}
