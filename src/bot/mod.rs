//! Trading bot module.
//!
//! This module handles:
//! - Bot configuration snapshots and validation
//! - Run state and the trade log
//! - The execution loop state machine
//! - The driver task that feeds it events

pub mod config;
pub mod driver;
pub mod engine;
pub mod state;

pub use config::{BotConfiguration, ContractType, TradeType};
pub use driver::{BotDriver, BotHandle, BotView, ControlCommand, SharedView};
pub use engine::{BotEngine, BotPhase, EngineSnapshot, Notice, StartOutcome, StopReason};
pub use state::{RunState, Trade, TradeLog};
