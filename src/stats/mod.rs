//! Tick statistics for display.
//!
//! This module handles:
//! - Last-digit extraction from quotes
//! - Rolling digit window and frequency statistics

pub mod digits;

pub use digits::{last_digit, DigitStats, DigitWindow, Volatility, VolatilityReport};
