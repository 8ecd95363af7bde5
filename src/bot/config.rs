//! Bot configuration snapshot and form validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::broker::messages::{BuyContract, ContractParameters};
use crate::error::{ConfigError, FieldError};

/// Maximum contracts in one bulk run.
pub const MAX_BULK_TRADES: u32 = 100;

/// Shortest and longest contract duration, in ticks.
pub const MIN_DURATION_TICKS: u8 = 1;
/// Longest contract duration, in ticks.
pub const MAX_DURATION_TICKS: u8 = 10;

/// Largest martingale multiplier accepted on the form.
pub const MAX_MARTINGALE_MULTIPLIER: u32 = 10;

/// Digit prediction chosen on the bot form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TradeType {
    /// Last digit equals the prediction.
    Matches,
    /// Last digit differs from the prediction.
    Differs,
    /// Last digit is even.
    Even,
    /// Last digit is odd.
    Odd,
    /// Last digit is above the prediction.
    Over,
    /// Last digit is below the prediction.
    Under,
}

impl TradeType {
    /// Vendor contract type for this prediction.
    pub fn contract_type(self) -> ContractType {
        match self {
            TradeType::Matches => ContractType::DigitMatch,
            TradeType::Differs => ContractType::DigitDiff,
            TradeType::Even => ContractType::DigitEven,
            TradeType::Odd => ContractType::DigitOdd,
            TradeType::Over => ContractType::DigitOver,
            TradeType::Under => ContractType::DigitUnder,
        }
    }

    /// Even/odd contracts carry no barrier digit.
    pub fn uses_barrier(self) -> bool {
        !matches!(self, TradeType::Even | TradeType::Odd)
    }
}

/// Vendor digit contract types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum ContractType {
    /// Digit matches.
    #[serde(rename = "DIGITMATCH")]
    #[strum(serialize = "DIGITMATCH")]
    DigitMatch,
    /// Digit differs.
    #[serde(rename = "DIGITDIFF")]
    #[strum(serialize = "DIGITDIFF")]
    DigitDiff,
    /// Digit even.
    #[serde(rename = "DIGITEVEN")]
    #[strum(serialize = "DIGITEVEN")]
    DigitEven,
    /// Digit odd.
    #[serde(rename = "DIGITODD")]
    #[strum(serialize = "DIGITODD")]
    DigitOdd,
    /// Digit over.
    #[serde(rename = "DIGITOVER")]
    #[strum(serialize = "DIGITOVER")]
    DigitOver,
    /// Digit under.
    #[serde(rename = "DIGITUNDER")]
    #[strum(serialize = "DIGITUNDER")]
    DigitUnder,
}

/// User-chosen trading parameters.
///
/// Taken as an immutable snapshot when a run starts; the engine never reads
/// live form values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfiguration {
    /// Market symbol, e.g. `R_100`.
    pub market: String,
    /// Digit prediction type.
    pub trade_type: TradeType,
    /// Contract duration in ticks (1-10).
    pub duration: u8,
    /// Predicted last digit (0-9).
    #[serde(default)]
    pub prediction: u8,
    /// Stake for the first purchase and after every win.
    pub initial_stake: Decimal,
    /// Stop once cumulative profit reaches this amount.
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Stop once cumulative loss reaches this amount (positive number).
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Multiply the stake after each loss.
    #[serde(default)]
    pub martingale: bool,
    /// Factor applied to the stake after a loss.
    #[serde(default = "default_multiplier")]
    pub martingale_multiplier: Decimal,
    /// Run a fixed batch of contracts without re-staking.
    #[serde(default)]
    pub bulk_trading: bool,
    /// Size of the batch when bulk trading.
    #[serde(default = "default_bulk_count")]
    pub bulk_trade_count: u32,
    /// Account currency.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_multiplier() -> Decimal {
    Decimal::TWO
}

fn default_bulk_count() -> u32 {
    1
}

fn default_currency() -> String {
    "USD".to_string()
}

impl BotConfiguration {
    /// Build a configuration with defaults for the optional fields.
    pub fn new(market: impl Into<String>, trade_type: TradeType, duration: u8, prediction: u8, initial_stake: Decimal) -> Self {
        Self {
            market: market.into(),
            trade_type,
            duration,
            prediction,
            initial_stake,
            take_profit: None,
            stop_loss: None,
            martingale: false,
            martingale_multiplier: default_multiplier(),
            bulk_trading: false,
            bulk_trade_count: default_bulk_count(),
            currency: default_currency(),
        }
    }

    /// Validate every field, collecting all failures.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.market.trim().is_empty() {
            errors.push(FieldError::new("market", "is required"));
        }

        if !(MIN_DURATION_TICKS..=MAX_DURATION_TICKS).contains(&self.duration) {
            errors.push(FieldError::new(
                "duration",
                format!("must be between {MIN_DURATION_TICKS} and {MAX_DURATION_TICKS} ticks"),
            ));
        }

        if self.prediction > 9 {
            errors.push(FieldError::new("prediction", "must be a digit between 0 and 9"));
        } else {
            match self.trade_type {
                TradeType::Over if self.prediction == 9 => {
                    errors.push(FieldError::new("prediction", "over 9 can never win"));
                }
                TradeType::Under if self.prediction == 0 => {
                    errors.push(FieldError::new("prediction", "under 0 can never win"));
                }
                _ => {}
            }
        }

        if self.initial_stake <= Decimal::ZERO {
            errors.push(FieldError::new("initialStake", "must be greater than zero"));
        }

        if self.take_profit.is_some_and(|tp| tp <= Decimal::ZERO) {
            errors.push(FieldError::new("takeProfit", "must be greater than zero"));
        }

        if self.stop_loss.is_some_and(|sl| sl <= Decimal::ZERO) {
            errors.push(FieldError::new("stopLoss", "must be greater than zero"));
        }

        if self.martingale
            && (self.martingale_multiplier <= Decimal::ONE
                || self.martingale_multiplier > Decimal::from(MAX_MARTINGALE_MULTIPLIER))
        {
            errors.push(FieldError::new(
                "martingaleMultiplier",
                format!("must be greater than 1 and at most {MAX_MARTINGALE_MULTIPLIER}"),
            ));
        }

        if self.bulk_trading && !(1..=MAX_BULK_TRADES).contains(&self.bulk_trade_count) {
            errors.push(FieldError::new(
                "bulkTradeCount",
                format!("must be between 1 and {MAX_BULK_TRADES}"),
            ));
        }

        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push(FieldError::new("currency", "must be a three-letter code"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { errors })
        }
    }

    /// Number of purchases issued when a run starts.
    pub fn slots(&self) -> u32 {
        if self.bulk_trading {
            self.bulk_trade_count
        } else {
            1
        }
    }

    /// Build the purchase command for the given stake.
    pub fn purchase(&self, stake: Decimal) -> BuyContract {
        let amount = stake.round_dp(2);
        BuyContract {
            buy: "1".to_string(),
            price: amount,
            parameters: ContractParameters {
                amount,
                basis: "stake".to_string(),
                contract_type: self.trade_type.contract_type(),
                currency: self.currency.to_uppercase(),
                duration: self.duration,
                duration_unit: "t".to_string(),
                symbol: self.market.clone(),
                barrier: self
                    .trade_type
                    .uses_barrier()
                    .then(|| self.prediction.to_string()),
            },
        }
    }
}
