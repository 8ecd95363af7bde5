//! Bot execution loop.
//!
//! A small reactive state machine: `start` issues one purchase per slot,
//! buy confirmations open trades, and each settlement updates P/L, re-stakes,
//! checks the stop rules and, outside bulk mode, issues the next purchase.
//!
//! ```text
//! Idle ──start──▶ Running ──stop / threshold / bulk done / disconnect / auth error──▶ Stopped
//!                    ▲                                                                  │
//!                    └──────────────────────────── start ───────────────────────────────┘
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::config::BotConfiguration;
use super::state::{RunState, Trade, TradeLog};
use crate::broker::gateway::ContractGateway;
use crate::broker::messages::{BuyReceipt, ContractUpdate, OutboundRequest, VendorError, VendorErrorClass};
use crate::error::{ConfigError, EngineError, WsError};
use crate::metrics;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// User pressed stop.
    Manual,
    /// Cumulative profit reached the take-profit threshold.
    TakeProfit,
    /// Cumulative loss reached the stop-loss threshold.
    StopLoss,
    /// Every bulk purchase settled or failed.
    BulkComplete,
    /// The live connection dropped.
    ConnectionLost,
    /// The vendor rejected the session's authorization.
    Unauthorized,
    /// The martingale stake grew past what a decimal can hold.
    StakeOverflow,
}

/// Lifecycle phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum BotPhase {
    /// Never started, or cleared.
    Idle,
    /// Issuing purchases.
    Running,
    /// Stopped; open contracts may still settle.
    Stopped(StopReason),
}

/// User-facing notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Start requested without a live connection.
    NotConnected,
    /// A run started.
    Started {
        /// Purchases issued.
        slots: u32,
    },
    /// A run stopped.
    Stopped {
        /// Why it stopped.
        reason: StopReason,
        /// Cumulative profit at the time.
        profit: Decimal,
    },
    /// A settled contract.
    Settled {
        /// Contract id.
        contract_id: String,
        /// Net profit.
        profit: Decimal,
        /// Won or lost.
        won: bool,
    },
    /// A purchase could not be placed.
    PurchaseFailed {
        /// Reason.
        message: String,
    },
    /// Non-benign vendor error.
    VendorError {
        /// Vendor code.
        code: String,
        /// Vendor message.
        message: String,
    },
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// Run started with this many purchases in flight.
    Started {
        /// Purchases issued.
        slots: u32,
    },
    /// A run is already active; nothing changed.
    AlreadyRunning,
    /// No live connection; nothing changed.
    NotConnected,
}

/// Serializable view of the loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Lifecycle phase.
    pub phase: BotPhase,
    /// Configuration of the current or last run.
    pub config: Option<BotConfiguration>,
    /// Run counters.
    pub state: RunState,
    /// Trade log, oldest first.
    pub trades: Vec<Trade>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            phase: BotPhase::Idle,
            config: None,
            state: RunState::default(),
            trades: Vec::new(),
        }
    }
}

/// The execution loop. Owns all run state; callers feed it vendor events.
///
/// Each start opens a new run. Contracts bought by an earlier run still
/// settle into their own trade record but never touch the current run.
pub struct BotEngine<G> {
    gateway: G,
    config: Option<BotConfiguration>,
    state: RunState,
    trades: TradeLog,
    phase: BotPhase,
    notices: Vec<Notice>,
    run_id: u64,
    /// Purchases sent by an earlier run and still unconfirmed.
    carried_over: u32,
}

impl<G: ContractGateway> BotEngine<G> {
    /// Create an idle engine.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            config: None,
            state: RunState::default(),
            trades: TradeLog::default(),
            phase: BotPhase::Idle,
            notices: Vec::new(),
            run_id: 0,
            carried_over: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> BotPhase {
        self.phase
    }

    /// Whether purchases are being issued.
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Run counters.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Trade log.
    pub fn trades(&self) -> &TradeLog {
        &self.trades
    }

    /// Configuration of the current or last run.
    pub fn config(&self) -> Option<&BotConfiguration> {
        self.config.as_ref()
    }

    /// Id of the current or last run. Zero before the first start.
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Take queued notices.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Serializable copy of the engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            config: self.config.clone(),
            state: self.state.clone(),
            trades: self.trades.trades().to_vec(),
        }
    }

    /// Start a run with an immutable configuration snapshot.
    ///
    /// Invalid configurations are rejected before anything is sent.
    #[instrument(skip(self, config), fields(market = %config.market, trade_type = %config.trade_type))]
    pub fn start(&mut self, config: BotConfiguration) -> Result<StartOutcome, ConfigError> {
        if self.state.running {
            debug!("Start ignored, already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        config.validate()?;

        if !self.gateway.is_connected() {
            warn!("Start refused, no live connection");
            self.notices.push(Notice::NotConnected);
            return Ok(StartOutcome::NotConnected);
        }

        self.run_id += 1;
        self.carried_over += self.state.awaiting_confirmation;
        self.state.reset(config.initial_stake);
        self.state.running = true;
        self.phase = BotPhase::Running;

        let slots = config.slots();
        info!(
            run_id = self.run_id,
            slots,
            stake = %config.initial_stake,
            martingale = config.martingale,
            bulk = config.bulk_trading,
            "Bot started"
        );
        self.config = Some(config);
        self.notices.push(Notice::Started { slots });

        for _ in 0..slots {
            self.purchase();
            if !self.state.running {
                break;
            }
        }

        // Every bulk send may have failed locally.
        if self.state.running {
            if let Some(reason) = self.config.as_ref().and_then(|c| self.stop_condition(c)) {
                self.halt(reason);
            }
        }

        Ok(StartOutcome::Started { slots })
    }

    /// Stop issuing purchases. Open contracts settle naturally.
    ///
    /// Returns `true` if this call stopped a running loop.
    pub fn stop(&mut self) -> bool {
        if !self.state.running {
            return false;
        }
        self.halt(StopReason::Manual);
        true
    }

    /// Reset counters and the trade log. Rejected while running.
    pub fn clear(&mut self) -> Result<(), EngineError> {
        if self.state.running {
            return Err(EngineError::ClearWhileRunning);
        }
        self.state = RunState::default();
        self.carried_over = 0;
        self.trades.clear();
        self.config = None;
        self.phase = BotPhase::Idle;
        Ok(())
    }

    /// A purchase was confirmed by the vendor.
    ///
    /// Confirmations arrive in send order, so purchases left unconfirmed by
    /// an earlier run are confirmed before any of the current run's.
    #[instrument(skip(self, receipt), fields(contract_id = %receipt.contract_id))]
    pub fn on_buy_confirmed(&mut self, receipt: &BuyReceipt) {
        let run_id = if self.carried_over > 0 {
            self.carried_over -= 1;
            self.run_id.saturating_sub(1)
        } else {
            self.state.awaiting_confirmation = self.state.awaiting_confirmation.saturating_sub(1);
            self.run_id
        };

        if self.trades.get(&receipt.contract_id).is_some() {
            debug!("Duplicate buy confirmation ignored");
            return;
        }

        let (market, contract_type) = match &self.config {
            Some(c) => (c.market.clone(), Some(c.trade_type.contract_type())),
            None => (String::new(), None),
        };

        self.trades.push(Trade {
            contract_id: receipt.contract_id.clone(),
            run_id,
            description: receipt.longcode.clone(),
            market,
            contract_type,
            stake: receipt.buy_price,
            payout: Decimal::ZERO,
            profit: Decimal::ZERO,
            won: false,
            settled: false,
            entry_digit: None,
            exit_digit: None,
            opened_at: Utc::now(),
            settled_at: None,
        });
        metrics::inc_buys_confirmed();

        if run_id != self.run_id {
            info!(buy_price = %receipt.buy_price, run_id, "Earlier run contract purchased");
            return;
        }

        self.state.runs += 1;
        self.state.total_stake += receipt.buy_price;
        self.state.open_contracts += 1;

        info!(buy_price = %receipt.buy_price, runs = self.state.runs, "Contract purchased");
    }

    /// A contract update arrived. Only the first settled update of a known
    /// contract has any effect, and only a current-run contract moves the
    /// run's counters, stake or purchases.
    #[instrument(skip(self, update), fields(contract_id = ?update.contract_id))]
    pub fn on_contract_settled(&mut self, update: &ContractUpdate) {
        if !update.is_settled() {
            return;
        }

        let Some(contract_id) = update.contract_id.as_deref() else {
            warn!("Settlement without contract id ignored");
            return;
        };

        let Some(trade) = self.trades.get_mut(contract_id) else {
            warn!("Settlement for unknown contract ignored");
            return;
        };

        if trade.settled {
            debug!("Repeated settlement ignored");
            return;
        }

        let won = update.is_won();
        trade.payout = update.payout;
        trade.profit = update.profit;
        trade.won = won;
        trade.settled = true;
        trade.entry_digit = update.entry_digit();
        trade.exit_digit = update.exit_digit();
        trade.settled_at = Some(Utc::now());
        let trade_run = trade.run_id;

        self.notices.push(Notice::Settled {
            contract_id: contract_id.to_string(),
            profit: update.profit,
            won,
        });

        if trade_run != self.run_id {
            info!(profit = %update.profit, won, run_id = trade_run, "Earlier run contract settled");
            return;
        }

        self.state.open_contracts = self.state.open_contracts.saturating_sub(1);
        self.state.total_profit += update.profit;
        if won {
            self.state.wins += 1;
            metrics::inc_contracts_won();
        } else {
            self.state.losses += 1;
            metrics::inc_contracts_lost();
        }

        info!(
            profit = %update.profit,
            won,
            total_profit = %self.state.total_profit,
            "Contract settled"
        );

        let Some(bulk) = self.config.as_ref().map(|c| c.bulk_trading) else {
            return;
        };

        // Re-stake first, then check the stop rules.
        if !bulk && !self.restake(won) {
            return;
        }

        if !self.state.running {
            return;
        }

        if let Some(reason) = self.config.as_ref().and_then(|c| self.stop_condition(c)) {
            self.halt(reason);
            return;
        }

        if !bulk {
            self.purchase();
        }
    }

    /// Set the next stake after a settlement. Returns `false` if the
    /// martingale stake overflowed.
    fn restake(&mut self, won: bool) -> bool {
        let Some(config) = self.config.as_ref() else {
            return true;
        };

        if won {
            self.state.current_stake = config.initial_stake;
            return true;
        }
        if !config.martingale {
            return true;
        }

        match self.state.current_stake.checked_mul(config.martingale_multiplier) {
            Some(stake) => {
                self.state.current_stake = stake;
                true
            }
            None => {
                warn!(
                    stake = %self.state.current_stake,
                    multiplier = %config.martingale_multiplier,
                    "Martingale stake overflowed"
                );
                if self.state.running {
                    self.halt(StopReason::StakeOverflow);
                }
                false
            }
        }
    }

    /// A request failed at the vendor.
    #[instrument(skip(self, error), fields(code = %error.code))]
    pub fn on_vendor_error(&mut self, msg_type: Option<&str>, error: &VendorError) {
        metrics::inc_vendor_errors();

        let class = error.class();
        if class == VendorErrorClass::Benign {
            debug!(message = %error.message, "Benign vendor error ignored");
            return;
        }

        let rejected_purchase = msg_type == Some("buy");
        if rejected_purchase && self.carried_over > 0 {
            self.carried_over -= 1;
            warn!(message = %error.message, "Earlier run purchase rejected");
        } else if rejected_purchase {
            // No retry: the loop idles until the next settlement or a restart.
            self.state.awaiting_confirmation = self.state.awaiting_confirmation.saturating_sub(1);
            self.state.failed += 1;
            warn!(message = %error.message, "Purchase rejected");
        } else {
            warn!(message = %error.message, msg_type = ?msg_type, "Vendor error");
        }

        self.notices.push(Notice::VendorError {
            code: error.code.clone(),
            message: error.message.clone(),
        });

        if !self.state.running {
            return;
        }
        if class == VendorErrorClass::Authorization {
            self.halt(StopReason::Unauthorized);
            return;
        }
        if rejected_purchase {
            if let Some(reason) = self.config.as_ref().and_then(|c| self.stop_condition(c)) {
                self.halt(reason);
            }
        }
    }

    /// The live connection dropped. Unconfirmed purchases are lost with it.
    pub fn on_connection_lost(&mut self) {
        self.state.awaiting_confirmation = 0;
        self.carried_over = 0;
        if self.state.running {
            self.halt(StopReason::ConnectionLost);
        }
    }

    fn stop_condition(&self, config: &BotConfiguration) -> Option<StopReason> {
        let profit = self.state.total_profit;

        if config.take_profit.is_some_and(|tp| profit >= tp) {
            return Some(StopReason::TakeProfit);
        }
        if config.stop_loss.is_some_and(|sl| profit <= -sl) {
            return Some(StopReason::StopLoss);
        }
        if config.bulk_trading && self.state.finished() >= config.bulk_trade_count {
            return Some(StopReason::BulkComplete);
        }
        None
    }

    /// Issue one purchase at the current stake. A send that fails counts as
    /// a failed purchase.
    fn purchase(&mut self) {
        let Some(config) = self.config.as_ref() else {
            return;
        };

        if self.state.awaiting_confirmation >= config.slots() {
            debug!("Purchase skipped, slot still awaiting confirmation");
            return;
        }

        let request = config.purchase(self.state.current_stake);
        let stake = request.parameters.amount;

        match self.gateway.send(OutboundRequest::Buy(request)) {
            Ok(()) => {
                self.state.awaiting_confirmation += 1;
                metrics::inc_purchases_sent();
                debug!(stake = %stake, "Purchase sent");
            }
            Err(e) => {
                self.state.failed += 1;
                warn!(error = %e, stake = %stake, "Purchase not sent");
                self.notices.push(Notice::PurchaseFailed { message: e.to_string() });
                if matches!(e, WsError::NotConnected) {
                    self.halt(StopReason::ConnectionLost);
                }
            }
        }
    }

    fn halt(&mut self, reason: StopReason) {
        self.state.running = false;
        self.phase = BotPhase::Stopped(reason);
        info!(reason = ?reason, total_profit = %self.state.total_profit, "Bot stopped");
        self.notices.push(Notice::Stopped {
            reason,
            profit: self.state.total_profit,
        });
    }
}
