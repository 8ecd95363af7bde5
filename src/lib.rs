//! Digit-contract trading bot.
//!
//! This library drives a staking loop against a brokerage's streaming API:
//! buying short-duration "last digit" contracts, re-staking on every
//! settlement with optional martingale progression, and halting on take
//! profit, stop loss or a completed bulk batch.
//!
//! # Staking
//!
//! With martingale enabled the stake resets to the initial stake after a win
//! and is multiplied after a loss:
//!
//! ```text
//! initial stake:   1.00, multiplier 2
//! loss, loss, loss, win
//! stakes:          1.00  2.00  4.00  8.00
//! profit:          -1.00 -2.00 -4.00 +7.60  =>  +0.60
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`broker`]: Vendor message codec and WebSocket connection manager
//! - [`bot`]: Bot configuration, execution loop and driver task
//! - [`stats`]: Last-digit frequency statistics
//! - [`ai`]: AI strategy backtest client
//! - [`api`]: HTTP API for control, health and metrics
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod ai;
pub mod api;
pub mod bot;
pub mod broker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod stats;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
