//! Connection manager against a local WebSocket server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use digit_bot::broker::{
    spawn_connection, BrokerEvent, ConnectionSettings, ContractGateway, InboundMessage, OutboundRequest,
    ReconnectConfig,
};

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

/// Accept WebSocket clients and hand each server-side socket to the test.
async fn ws_server() -> (Url, mpsc::Receiver<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("ws://{}/websockets/v3?app_id=1089", listener.local_addr().unwrap())).unwrap();
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            if tx.send(ws).await.is_err() {
                break;
            }
        }
    });

    (url, rx)
}

fn settings(url: Url) -> ConnectionSettings {
    ConnectionSettings {
        url,
        api_token: Some("test-token".to_string()),
        tick_symbol: Some("R_100".to_string()),
        reconnect: ReconnectConfig {
            initial_delay_ms: 20,
            max_delay_s: 1,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 60,
        },
    }
}

async fn next_json(socket: &mut ServerSocket) -> serde_json::Value {
    loop {
        let message = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_event(events: &mut mpsc::Receiver<BrokerEvent>) -> BrokerEvent {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn authorizes_subscribes_and_forwards_frames() {
    let (url, mut accepted) = ws_server().await;
    let (handle, mut events, task) = spawn_connection(settings(url));

    let mut socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(next_json(&mut socket).await, serde_json::json!({"authorize": "test-token"}));
    assert_eq!(
        next_json(&mut socket).await,
        serde_json::json!({"ticks": "R_100", "subscribe": 1})
    );

    assert_eq!(next_event(&mut events).await, BrokerEvent::Connected);
    assert!(handle.is_connected());

    let tick = r#"{"msg_type":"tick","tick":{"symbol":"R_100","quote":"1043.27","pip_size":2,"epoch":1700000000}}"#;
    socket.send(Message::Text(tick.to_string())).await.unwrap();

    match next_event(&mut events).await {
        BrokerEvent::Message(InboundMessage::Tick(tick)) => {
            assert_eq!(tick.symbol, "R_100");
            assert_eq!(tick.epoch, 1_700_000_000);
        }
        other => panic!("expected tick, got {other:?}"),
    }

    assert_ok!(handle.send(OutboundRequest::SubscribeContract("4242".to_string())));
    assert_eq!(
        next_json(&mut socket).await,
        serde_json::json!({"proposal_open_contract": 1, "contract_id": 4242, "subscribe": 1})
    );

    task.abort();
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_server_close() {
    let (url, mut accepted) = ws_server().await;
    let (handle, mut events, task) = spawn_connection(settings(url));

    let mut first = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    next_json(&mut first).await;
    next_json(&mut first).await;
    assert_eq!(next_event(&mut events).await, BrokerEvent::Connected);

    first.close(None).await.unwrap();

    assert!(matches!(next_event(&mut events).await, BrokerEvent::Disconnected { .. }));
    assert!(!handle.is_connected());
    assert_err!(handle.send(OutboundRequest::Ping));

    let mut second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    assert_eq!(next_json(&mut second).await["authorize"], "test-token");
    assert_eq!(next_json(&mut second).await["ticks"], "R_100");
    assert_eq!(next_event(&mut events).await, BrokerEvent::Connected);
    assert!(handle.reconnect_attempts() >= 1);

    task.abort();
}

#[tokio::test]
async fn unparseable_frames_are_dropped() {
    let (url, mut accepted) = ws_server().await;
    let (_handle, mut events, task) = spawn_connection(settings(url));

    let mut socket = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    next_json(&mut socket).await;
    next_json(&mut socket).await;
    assert_eq!(next_event(&mut events).await, BrokerEvent::Connected);

    socket.send(Message::Text("not json".to_string())).await.unwrap();
    socket
        .send(Message::Text(r#"{"msg_type":"ping","ping":"pong"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await, BrokerEvent::Message(InboundMessage::Pong));

    task.abort();
}
