//! Prometheus metrics for the bot and its connections.
//!
//! This module provides:
//! - Purchase and settlement counters
//! - WebSocket message counters and processing latency
//! - AI backtest request latency
//! - Prometheus recorder installation

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Purchase commands sent counter metric name.
pub const METRIC_PURCHASES_SENT: &str = "purchases_sent_total";
/// Buy confirmations counter metric name.
pub const METRIC_BUYS_CONFIRMED: &str = "buys_confirmed_total";
/// Contracts won counter metric name.
pub const METRIC_CONTRACTS_WON: &str = "contracts_won_total";
/// Contracts lost counter metric name.
pub const METRIC_CONTRACTS_LOST: &str = "contracts_lost_total";
/// Vendor errors counter metric name.
pub const METRIC_VENDOR_ERRORS: &str = "vendor_errors_total";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// WebSocket message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// AI request latency metric name.
pub const METRIC_AI_REQUEST_LATENCY: &str = "ai_request_latency_ms";

/// Install the Prometheus recorder and describe all metrics.
/// Call this once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions.
pub fn init_metrics() {
    describe_counter!(METRIC_PURCHASES_SENT, "Total number of purchase commands sent");
    describe_counter!(METRIC_BUYS_CONFIRMED, "Total number of purchases confirmed");
    describe_counter!(METRIC_CONTRACTS_WON, "Total number of contracts settled as won");
    describe_counter!(METRIC_CONTRACTS_LOST, "Total number of contracts settled as lost");
    describe_counter!(METRIC_VENDOR_ERRORS, "Total number of vendor error replies");
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of WebSocket messages received"
    );
    describe_counter!(METRIC_WS_RECONNECTS, "Total number of WebSocket reconnections");

    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_histogram!(
        METRIC_AI_REQUEST_LATENCY,
        "AI backtest request latency in milliseconds"
    );

    debug!("Metrics initialized");
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(elapsed_ms(start));
}

/// Record AI request latency.
pub fn record_ai_request_latency(start: Instant) {
    histogram!(METRIC_AI_REQUEST_LATENCY).record(elapsed_ms(start));
}

/// Increment purchases sent counter.
pub fn inc_purchases_sent() {
    counter!(METRIC_PURCHASES_SENT).increment(1);
}

/// Increment buys confirmed counter.
pub fn inc_buys_confirmed() {
    counter!(METRIC_BUYS_CONFIRMED).increment(1);
}

/// Increment contracts won counter.
pub fn inc_contracts_won() {
    counter!(METRIC_CONTRACTS_WON).increment(1);
}

/// Increment contracts lost counter.
pub fn inc_contracts_lost() {
    counter!(METRIC_CONTRACTS_LOST).increment(1);
}

/// Increment vendor errors counter.
pub fn inc_vendor_errors() {
    counter!(METRIC_VENDOR_ERRORS).increment(1);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
