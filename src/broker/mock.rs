//! In-memory gateway for unit testing.
//!
//! Records every request instead of touching the network, and lets tests
//! flip the connection state or make sends fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;

use crate::error::WsError;

use super::gateway::ContractGateway;
use super::messages::{BuyContract, OutboundRequest};

/// Mock gateway. Clones share state, so a test can keep one clone while the
/// engine owns another.
#[derive(Debug, Clone)]
pub struct MockGateway {
    connected: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl MockGateway {
    /// Create a connected mock.
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            fail_sends: Arc::new(AtomicBool::new(false)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock with no live connection.
    pub fn disconnected() -> Self {
        let mock = Self::new();
        mock.set_connected(false);
        mock
    }

    /// Change the reported connection state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent sends fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Every request sent so far.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Purchase commands sent so far.
    pub fn purchases(&self) -> Vec<BuyContract> {
        self.sent()
            .into_iter()
            .filter_map(|r| match r {
                OutboundRequest::Buy(buy) => Some(buy),
                _ => None,
            })
            .collect()
    }

    /// Stakes of the purchase commands sent so far.
    pub fn stakes(&self) -> Vec<Decimal> {
        self.purchases().iter().map(|b| b.parameters.amount).collect()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractGateway for MockGateway {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, request: OutboundRequest) -> Result<(), WsError> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(WsError::SendFailed("mock send failure".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request);
        }
        Ok(())
    }
}
