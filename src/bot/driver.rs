//! Driver task: the single owner of the execution loop.
//!
//! Vendor events and control commands are funnelled into one task so all
//! engine mutation happens in one place. After each command, and each event
//! that reached the engine, the driver publishes a snapshot for readers (the
//! HTTP API).

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use super::config::BotConfiguration;
use super::engine::{BotEngine, EngineSnapshot, Notice, StartOutcome};
use crate::broker::connection::BrokerEvent;
use crate::broker::gateway::ContractGateway;
use crate::broker::messages::{InboundMessage, OutboundRequest};
use crate::error::{ConfigError, EngineError};
use crate::stats::DigitWindow;

/// Notices kept for display.
const MAX_RECENT_NOTICES: usize = 50;

/// Capacity of the control channel.
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Requests from the outside world.
#[derive(Debug)]
pub enum ControlCommand {
    /// Start a run.
    Start {
        /// Configuration snapshot.
        config: BotConfiguration,
        /// Reply.
        reply: oneshot::Sender<Result<StartOutcome, ConfigError>>,
    },
    /// Stop the run.
    Stop {
        /// Reply: whether a running loop was stopped.
        reply: oneshot::Sender<bool>,
    },
    /// Clear run state.
    Clear {
        /// Reply.
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
}

/// Published view of the bot.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotView {
    /// Engine state.
    #[serde(flatten)]
    pub engine: EngineSnapshot,
    /// Most recent notices, oldest first.
    pub notices: VecDeque<Notice>,
}

/// State shared between the driver and readers.
#[derive(Debug, Clone)]
pub struct SharedView {
    /// Latest bot view.
    pub bot: Arc<RwLock<BotView>>,
    /// Rolling digit window.
    pub digits: Arc<RwLock<DigitWindow>>,
}

impl SharedView {
    /// Create an empty view with the given digit window size.
    pub fn new(digit_window: usize) -> Self {
        Self {
            bot: Arc::new(RwLock::new(BotView::default())),
            digits: Arc::new(RwLock::new(DigitWindow::new(digit_window))),
        }
    }
}

/// Client side of the control channel.
#[derive(Debug, Clone)]
pub struct BotHandle {
    tx: mpsc::Sender<ControlCommand>,
}

impl BotHandle {
    /// Create a handle and the matching receiver.
    pub fn channel() -> (Self, mpsc::Receiver<ControlCommand>) {
        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Start a run.
    pub async fn start(&self, config: BotConfiguration) -> Result<Result<StartOutcome, ConfigError>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(ControlCommand::Start { config, reply }, rx).await
    }

    /// Stop the run.
    pub async fn stop(&self) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(ControlCommand::Stop { reply }, rx).await
    }

    /// Clear run state.
    pub async fn clear(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.request(ControlCommand::Clear { reply }, rx).await?
    }

    async fn request<T>(&self, command: ControlCommand, rx: oneshot::Receiver<T>) -> Result<T, EngineError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::DriverUnavailable)?;
        rx.await.map_err(|_| EngineError::DriverUnavailable)
    }
}

/// Owns the engine and routes events into it.
pub struct BotDriver<G> {
    engine: BotEngine<G>,
    gateway: G,
    tick_symbol: Option<String>,
    view: SharedView,
    notices: VecDeque<Notice>,
    /// Engine changed since the last publish.
    dirty: bool,
}

impl<G: ContractGateway + Clone> BotDriver<G> {
    /// Create a driver. `tick_symbol` selects which ticks feed the digit window.
    pub fn new(gateway: G, tick_symbol: Option<String>, view: SharedView) -> Self {
        Self {
            engine: BotEngine::new(gateway.clone()),
            gateway,
            tick_symbol,
            view,
            notices: VecDeque::with_capacity(MAX_RECENT_NOTICES),
            dirty: false,
        }
    }

    /// The engine, for inspection.
    pub fn engine(&self) -> &BotEngine<G> {
        &self.engine
    }

    /// Process events and commands until both channels close.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<BrokerEvent>,
        mut control: mpsc::Receiver<ControlCommand>,
    ) {
        info!("Bot driver started");
        self.publish().await;

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(command) = control.recv() => self.handle_command(command).await,
                else => break,
            }
            if self.dirty {
                self.publish().await;
            }
        }

        info!("Bot driver stopped");
    }

    /// Route one broker event.
    pub async fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => info!("Broker connected"),
            BrokerEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Broker disconnected");
                self.engine.on_connection_lost();
                self.dirty = true;
            }
            BrokerEvent::Message(message) => self.handle_message(message).await,
        }
    }

    async fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Tick(tick) => {
                if self.tick_symbol.as_deref().is_some_and(|s| s == tick.symbol) {
                    let digit = self.view.digits.write().await.push_quote(tick.quote, tick.pip_size);
                    debug!(quote = %tick.quote, digit, "Tick");
                }
            }
            InboundMessage::BuyConfirmed(receipt) => {
                self.engine.on_buy_confirmed(&receipt);
                self.dirty = true;
                if let Err(e) = self
                    .gateway
                    .send(OutboundRequest::SubscribeContract(receipt.contract_id.clone()))
                {
                    warn!(error = %e, contract_id = %receipt.contract_id, "Could not subscribe to contract");
                }
            }
            InboundMessage::ContractUpdate(update) => {
                // Open-contract updates stream every tick until settlement.
                if update.is_settled() {
                    self.engine.on_contract_settled(&update);
                    self.dirty = true;
                }
            }
            InboundMessage::Error { msg_type, error } => {
                self.engine.on_vendor_error(msg_type.as_deref(), &error);
                self.dirty = true;
            }
            InboundMessage::Authorized(account) => {
                info!(loginid = ?account.loginid, currency = ?account.currency, balance = ?account.balance, "Authorized");
            }
            InboundMessage::Pong => debug!("Pong"),
            InboundMessage::Other(msg_type) => debug!(msg_type = %msg_type, "Unhandled message"),
        }
    }

    /// Apply one control command. The view is published before replying.
    pub async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Start { config, reply } => {
                let outcome = self.engine.start(config);
                self.publish().await;
                let _ = reply.send(outcome);
            }
            ControlCommand::Stop { reply } => {
                let stopped = self.engine.stop();
                self.publish().await;
                let _ = reply.send(stopped);
            }
            ControlCommand::Clear { reply } => {
                let result = self.engine.clear();
                if result.is_ok() {
                    self.notices.clear();
                }
                self.publish().await;
                let _ = reply.send(result);
            }
        }
    }

    /// Publish the current snapshot and recent notices.
    pub async fn publish(&mut self) {
        self.dirty = false;
        for notice in self.engine.drain_notices() {
            info!(notice = ?notice, "Notice");
            if self.notices.len() == MAX_RECENT_NOTICES {
                self.notices.pop_front();
            }
            self.notices.push_back(notice);
        }

        let mut view = self.view.bot.write().await;
        view.engine = self.engine.snapshot();
        view.notices = self.notices.clone();
    }
}
