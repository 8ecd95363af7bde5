//! Brokerage streaming API plumbing.
//!
//! This module handles:
//! - Typed vendor messages and error classification
//! - The WebSocket connection manager
//! - The send-only gateway the execution loop talks to

pub mod connection;
pub mod gateway;
pub mod messages;
pub mod mock;

pub use connection::{spawn_connection, BrokerEvent, ConnectionHandle, ConnectionSettings, ReconnectConfig};
pub use gateway::ContractGateway;
pub use messages::{InboundMessage, OutboundRequest, VendorError, VendorErrorClass};
pub use mock::MockGateway;
