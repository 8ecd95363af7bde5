//! Driver task fed with raw vendor frames.

use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use digit_bot::bot::{
    BotConfiguration, BotDriver, BotHandle, BotPhase, BotView, Notice, SharedView, StartOutcome, StopReason,
    TradeType,
};
use digit_bot::broker::messages::parse_inbound;
use digit_bot::broker::{BrokerEvent, MockGateway, OutboundRequest};

struct Harness {
    gateway: MockGateway,
    view: SharedView,
    bot: BotHandle,
    events: mpsc::Sender<BrokerEvent>,
    task: JoinHandle<()>,
}

fn harness() -> Harness {
    let gateway = MockGateway::new();
    let view = SharedView::new(50);
    let (bot, control_rx) = BotHandle::channel();
    let (events, event_rx) = mpsc::channel(64);
    let driver = BotDriver::new(gateway.clone(), Some("R_100".to_string()), view.clone());
    let task = tokio::spawn(driver.run(event_rx, control_rx));
    Harness {
        gateway,
        view,
        bot,
        events,
        task,
    }
}

impl Harness {
    async fn frame(&self, value: serde_json::Value) {
        let message = parse_inbound(&value.to_string()).unwrap();
        self.events.send(BrokerEvent::Message(message)).await.unwrap();
    }

    /// Wait until the published view satisfies `pred`.
    async fn wait_for(&self, pred: impl Fn(&BotView) -> bool) -> BotView {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            {
                let view = self.view.bot.read().await;
                if pred(&view) {
                    return view.clone();
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "view never reached expected state");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn shutdown(self) {
        drop(self.bot);
        drop(self.events);
        self.task.await.unwrap();
    }
}

fn martingale_config() -> BotConfiguration {
    let mut config = BotConfiguration::new("R_100", TradeType::Differs, 1, 7, dec!(0.35));
    config.martingale = true;
    config.martingale_multiplier = dec!(2);
    config
}

#[tokio::test]
async fn buy_and_settlement_frames_drive_the_loop() {
    let h = harness();
    let outcome = h.bot.start(martingale_config()).await.unwrap().unwrap();
    assert_eq!(outcome, StartOutcome::Started { slots: 1 });

    h.frame(json!({
        "msg_type": "buy",
        "buy": {"contract_id": 250001, "buy_price": 0.35, "longcode": "Win payout if the last digit is not 7."}
    }))
    .await;
    h.frame(json!({
        "msg_type": "proposal_open_contract",
        "proposal_open_contract": {
            "contract_id": 250001, "is_sold": 1, "status": "lost",
            "profit": "-0.35", "payout": "0.37",
            "entry_tick": 1234.56, "exit_tick_display_value": "1234.57"
        }
    }))
    .await;

    let view = h.wait_for(|v| v.engine.state.losses == 1).await;
    assert_eq!(view.engine.state.total_profit, dec!(-0.35));
    assert_eq!(view.engine.trades.len(), 1);
    assert_eq!(view.engine.trades[0].exit_digit, Some(7));
    assert!(view.notices.iter().any(|n| matches!(n, Notice::Settled { won: false, .. })));

    assert_eq!(h.gateway.stakes(), vec![dec!(0.35), dec!(0.70)]);
    assert!(h
        .gateway
        .sent()
        .contains(&OutboundRequest::SubscribeContract("250001".to_string())));

    h.shutdown().await;
}

#[tokio::test]
async fn open_contract_updates_are_ignored() {
    let h = harness();
    h.bot.start(martingale_config()).await.unwrap().unwrap();

    h.frame(json!({"msg_type": "buy", "buy": {"contract_id": "9", "buy_price": "0.35"}})).await;
    h.frame(json!({
        "msg_type": "proposal_open_contract",
        "proposal_open_contract": {"contract_id": "9", "is_sold": 0, "status": "open", "profit": "0.1"}
    }))
    .await;

    let view = h.wait_for(|v| v.engine.state.runs == 1).await;
    assert_eq!(view.engine.state.settled(), 0);
    assert_eq!(view.engine.state.open_contracts, 1);
    assert_eq!(h.gateway.purchases().len(), 1);

    h.shutdown().await;
}

#[tokio::test]
async fn authorization_error_stops_the_run() {
    let h = harness();
    h.bot.start(martingale_config()).await.unwrap().unwrap();

    h.frame(json!({
        "msg_type": "buy",
        "error": {"code": "InvalidToken", "message": "The token is invalid."}
    }))
    .await;

    let view = h
        .wait_for(|v| v.engine.phase == BotPhase::Stopped(StopReason::Unauthorized))
        .await;
    assert!(view
        .notices
        .iter()
        .any(|n| matches!(n, Notice::VendorError { code, .. } if code == "InvalidToken")));

    h.shutdown().await;
}

#[tokio::test]
async fn benign_error_keeps_running() {
    let h = harness();
    h.bot.start(martingale_config()).await.unwrap().unwrap();

    h.frame(json!({
        "msg_type": "ticks",
        "error": {"code": "AlreadySubscribed", "message": "You are already subscribed to R_100."}
    }))
    .await;
    h.frame(json!({"msg_type": "tick", "tick": {"symbol": "R_100", "quote": 812.43, "pip_size": 2, "epoch": 1}}))
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while h.view.digits.read().await.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "tick never reached the digit window");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(h.view.digits.read().await.latest(), Some(3));
    assert_eq!(h.view.bot.read().await.engine.phase, BotPhase::Running);

    h.shutdown().await;
}

#[tokio::test]
async fn disconnect_halts_and_start_is_refused_until_reconnected() {
    let h = harness();
    h.bot.start(martingale_config()).await.unwrap().unwrap();

    h.gateway.set_connected(false);
    h.events
        .send(BrokerEvent::Disconnected {
            reason: "stream ended".to_string(),
        })
        .await
        .unwrap();
    h.wait_for(|v| v.engine.phase == BotPhase::Stopped(StopReason::ConnectionLost))
        .await;

    let outcome = h.bot.start(martingale_config()).await.unwrap().unwrap();
    assert_eq!(outcome, StartOutcome::NotConnected);

    h.gateway.set_connected(true);
    h.events.send(BrokerEvent::Connected).await.unwrap();
    let outcome = h.bot.start(martingale_config()).await.unwrap().unwrap();
    assert_eq!(outcome, StartOutcome::Started { slots: 1 });

    h.shutdown().await;
}
