//! Send-only view of the brokerage connection.

use crate::error::WsError;

use super::messages::OutboundRequest;

/// What the execution loop needs from the connection: a liveness check and
/// a fire-and-forget send. Replies arrive later as independent events.
pub trait ContractGateway: Send {
    /// Whether a live, open connection exists.
    fn is_connected(&self) -> bool;

    /// Queue a request for sending.
    fn send(&self, request: OutboundRequest) -> Result<(), WsError>;
}
