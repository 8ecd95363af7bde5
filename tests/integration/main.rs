//! Integration tests for the digit bot.
//!
//! Everything runs against in-process fakes: the execution loop against
//! `MockGateway`, the connection manager against a local WebSocket server,
//! and the backtest client against a local HTTP server.

mod backtest;
mod connection;
mod driver;
mod engine;
