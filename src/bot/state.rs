//! Run state and trade log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::config::ContractType;

/// Mutable execution state of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Stake for the next purchase.
    pub current_stake: Decimal,
    /// Sum of settled net profit.
    pub total_profit: Decimal,
    /// Sum of confirmed buy prices.
    pub total_stake: Decimal,
    /// Confirmed purchases.
    pub runs: u32,
    /// Contracts settled as won.
    pub wins: u32,
    /// Contracts settled as lost.
    pub losses: u32,
    /// Whether the loop issues further purchases.
    pub running: bool,
    /// Purchased contracts not yet settled.
    pub open_contracts: u32,
    /// Purchase commands sent but not yet confirmed.
    pub awaiting_confirmation: u32,
    /// Purchases that were rejected or never sent.
    pub failed: u32,
}

impl RunState {
    /// Reset counters for a fresh run.
    pub fn reset(&mut self, initial_stake: Decimal) {
        *self = Self {
            current_stake: initial_stake,
            ..Self::default()
        };
    }

    /// Contracts that have settled this run.
    pub fn settled(&self) -> u32 {
        self.wins + self.losses
    }

    /// Purchases that are done this run, settled or failed.
    pub fn finished(&self) -> u32 {
        self.settled() + self.failed
    }
}

/// One purchased contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Vendor-assigned contract id.
    pub contract_id: String,
    /// Run that bought the contract.
    pub run_id: u64,
    /// Human-readable contract description.
    pub description: String,
    /// Market symbol.
    pub market: String,
    /// Contract type purchased.
    pub contract_type: Option<ContractType>,
    /// Buy price.
    pub stake: Decimal,
    /// Gross payout reported at settlement.
    pub payout: Decimal,
    /// Net profit reported at settlement.
    pub profit: Decimal,
    /// Settled as won.
    pub won: bool,
    /// Settlement has been applied.
    pub settled: bool,
    /// Last digit of the entry tick.
    pub entry_digit: Option<u8>,
    /// Last digit of the exit tick.
    pub exit_digit: Option<u8>,
    /// Buy confirmation time.
    pub opened_at: DateTime<Utc>,
    /// Settlement time.
    pub settled_at: Option<DateTime<Utc>>,
}

/// Append-only log of trades, most recent last.
#[derive(Debug, Clone, Default)]
pub struct TradeLog {
    trades: Vec<Trade>,
}

impl TradeLog {
    /// Append a newly confirmed trade.
    pub fn push(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    /// Find a trade by contract id.
    pub fn get(&self, contract_id: &str) -> Option<&Trade> {
        self.trades.iter().rev().find(|t| t.contract_id == contract_id)
    }

    /// Find a trade by contract id for update.
    pub fn get_mut(&mut self, contract_id: &str) -> Option<&mut Trade> {
        self.trades
            .iter_mut()
            .rev()
            .find(|t| t.contract_id == contract_id)
    }

    /// All trades, oldest first.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Number of trades.
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Drop every trade.
    pub fn clear(&mut self) {
        self.trades.clear();
    }
}
