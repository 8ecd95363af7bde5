//! AI strategy backtest via a hosted language model.

pub mod backtest;

pub use backtest::{mock_history, parse_report, BacktestClient, BacktestReport, BacktestRequest, Candle};
