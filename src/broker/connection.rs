//! WebSocket connection manager for the brokerage streaming API.
//!
//! Features:
//! - Automatic reconnection with exponential backoff
//! - Authorization and tick resubscription on every (re)connect
//! - Keep-alive pings
//! - Send-only handle shared with the execution loop

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::gateway::ContractGateway;
use super::messages::{parse_inbound, InboundMessage, OutboundRequest};
use crate::config::Config;
use crate::error::WsError;
use crate::metrics;

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Reconnection configuration for WebSocket.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_s: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 30,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(max_delay_s: u64, heartbeat_interval_s: u64) -> Self {
        Self {
            max_delay_s,
            heartbeat_interval_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s.saturating_mul(1000);
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Full endpoint URL including `app_id`.
    pub url: Url,
    /// Token sent in `authorize` after each connect.
    pub api_token: Option<String>,
    /// Tick stream resubscribed after each connect.
    pub tick_symbol: Option<String>,
    /// Backoff and keep-alive.
    pub reconnect: ReconnectConfig,
}

impl ConnectionSettings {
    /// Build the endpoint URL from a base URL and app id.
    pub fn endpoint(base: &str, app_id: &str) -> Result<Url, WsError> {
        let mut url = Url::parse(base)?;
        url.query_pairs_mut().append_pair("app_id", app_id);
        Ok(url)
    }

    /// Settings from application configuration.
    pub fn from_config(config: &Config) -> Result<Self, WsError> {
        Ok(Self {
            url: Self::endpoint(&config.deriv_ws_url, &config.deriv_app_id)?,
            api_token: config.deriv_api_token.clone().filter(|t| !t.trim().is_empty()),
            tick_symbol: Some(config.tick_symbol.clone()),
            reconnect: ReconnectConfig::from_config(config.reconnect_max_delay_s, config.heartbeat_interval_s),
        })
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Socket opened (initial connect or reconnect).
    Connected,
    /// Socket dropped; a reconnect follows.
    Disconnected {
        /// Why it dropped.
        reason: String,
    },
    /// Parsed vendor message.
    Message(InboundMessage),
}

/// Cheap, cloneable send handle to the live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    reconnects: Arc<AtomicU64>,
}

impl ConnectionHandle {
    /// Number of reconnect attempts so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Shared connection flag, for readiness checks.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }
}

impl ContractGateway for ConnectionHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, request: OutboundRequest) -> Result<(), WsError> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }
        let json = request.to_json().map_err(|e| WsError::SendFailed(e.to_string()))?;
        debug!(kind = request.kind(), "Queueing request");
        self.outbound
            .send(json)
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }
}

/// How a session ended without error.
enum SessionEnd {
    /// Every handle was dropped.
    HandleDropped,
    /// Nobody is listening for events.
    ListenerGone,
}

/// Spawn the connection manager.
///
/// The task keeps reconnecting until every `ConnectionHandle` clone or the
/// event receiver is dropped.
pub fn spawn_connection(
    settings: ConnectionSettings,
) -> (ConnectionHandle, mpsc::Receiver<BrokerEvent>, JoinHandle<()>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let handle = ConnectionHandle {
        outbound: out_tx,
        connected: Arc::new(AtomicBool::new(false)),
        reconnects: Arc::new(AtomicU64::new(0)),
    };

    let task = tokio::spawn(run_with_reconnect(
        settings,
        out_rx,
        event_tx,
        handle.connected.clone(),
        handle.reconnects.clone(),
    ));

    (handle, event_rx, task)
}

async fn run_with_reconnect(
    settings: ConnectionSettings,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<BrokerEvent>,
    connected: Arc<AtomicBool>,
    reconnects: Arc<AtomicU64>,
) {
    let mut attempt = 0u32;

    loop {
        info!(attempt, url = %redacted(&settings.url), "Attempting WebSocket connection");

        let result = run_session(&settings, &mut outbound, &events, &connected, &mut attempt).await;
        let was_connected = connected.swap(false, Ordering::SeqCst);

        // Anything queued for the dead socket is stale.
        let mut dropped = 0;
        while outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Discarded requests queued for closed connection");
        }

        let reason = match result {
            Ok(SessionEnd::HandleDropped) => {
                info!("All connection handles dropped, stopping WebSocket");
                return;
            }
            Ok(SessionEnd::ListenerGone) => {
                info!("Event channel closed, stopping WebSocket");
                return;
            }
            Err(e) => {
                error!(error = %e, attempt, "WebSocket session ended");
                e.to_string()
            }
        };

        if was_connected && events.send(BrokerEvent::Disconnected { reason }).await.is_err() {
            return;
        }

        let delay = settings.reconnect.next_delay(attempt);
        reconnects.fetch_add(1, Ordering::SeqCst);
        metrics::inc_ws_reconnects();

        info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
        tokio::time::sleep(delay).await;

        attempt = attempt.saturating_add(1);
    }
}

async fn run_session(
    settings: &ConnectionSettings,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::Sender<BrokerEvent>,
    connected: &AtomicBool,
    attempt: &mut u32,
) -> Result<SessionEnd, WsError> {
    let (ws_stream, _) = connect_async(settings.url.as_str())
        .await
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    if let Some(token) = &settings.api_token {
        send_request(&mut write, &OutboundRequest::Authorize(token.clone())).await?;
    }
    if let Some(symbol) = &settings.tick_symbol {
        send_request(&mut write, &OutboundRequest::SubscribeTicks(symbol.clone())).await?;
        info!(symbol = %symbol, "Subscribed to ticks");
    }

    connected.store(true, Ordering::SeqCst);
    *attempt = 0;
    if events.send(BrokerEvent::Connected).await.is_err() {
        return Ok(SessionEnd::ListenerGone);
    }

    let period = Duration::from_secs(settings.reconnect.heartbeat_interval_s.max(1));
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let start = Instant::now();
                    metrics::inc_ws_messages_received();
                    match parse_inbound(&text) {
                        Ok(message) => {
                            if events.send(BrokerEvent::Message(message)).await.is_err() {
                                return Ok(SessionEnd::ListenerGone);
                            }
                        }
                        Err(e) => warn!(error = %e, "Unparseable message dropped"),
                    }
                    metrics::record_ws_message_latency(start);
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "WebSocket closed");
                    return Err(WsError::ConnectionClosed {
                        code: frame.as_ref().map(|f| u16::from(f.code)),
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                }
            },
            out = outbound.recv() => match out {
                Some(json) => write
                    .send(Message::Text(json))
                    .await
                    .map_err(|e| WsError::SendFailed(e.to_string()))?,
                None => {
                    let _ = write.close().await;
                    return Ok(SessionEnd::HandleDropped);
                }
            },
            _ = heartbeat.tick() => {
                send_request(&mut write, &OutboundRequest::Ping).await?;
            }
        }
    }
}

async fn send_request<S>(write: &mut S, request: &OutboundRequest) -> Result<(), WsError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = request.to_json().map_err(|e| WsError::SendFailed(e.to_string()))?;
    write
        .send(Message::Text(json))
        .await
        .map_err(|e| WsError::SendFailed(e.to_string()))
}

/// URL without the query string, for logs.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
