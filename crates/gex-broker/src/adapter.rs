//! The broker-pool-level adapter contract.
//!
//! Distinct from the narrow submit/cancel/replace adapter gex-execution
//! speaks to a single order router: this trait is what a `Session` drives
//! through its connection lifecycle — connect/heartbeat/disconnect plus the
//! handful of calls the pool needs to keep positions honest.

use gex_reconcile::{BrokerSnapshot, OrderSnapshot, Side};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosePositionRequest {
    pub symbol: String,
    pub qty_signed: i64,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum BrokerAdapterError {
    #[error("broker connection refused: {0}")]
    ConnectFailed(String),
    #[error("broker heartbeat failed: {0}")]
    HeartbeatFailed(String),
    #[error("broker rejected request: {0}")]
    Rejected(String),
    #[error("broker transport error: {0}")]
    Transport(String),
}

/// A live connection to a single broker account. One `Session` owns exactly
/// one adapter instance; the pool never shares an adapter across sessions.
#[async_trait::async_trait]
pub trait BrokerAdapter: Send + Sync + 'static {
    async fn connect(&mut self) -> Result<(), BrokerAdapterError>;

    async fn disconnect(&mut self) -> Result<(), BrokerAdapterError>;

    /// A single heartbeat probe. `Ok(())` counts as a hit; any `Err` counts
    /// as a miss towards the session's health policy.
    async fn heartbeat(&mut self) -> Result<(), BrokerAdapterError>;

    async fn submit_order(
        &mut self,
        req: SubmitOrderRequest,
    ) -> Result<OrderSnapshot, BrokerAdapterError>;

    async fn close_position(
        &mut self,
        req: ClosePositionRequest,
    ) -> Result<OrderSnapshot, BrokerAdapterError>;

    async fn list_positions(&mut self) -> Result<BrokerSnapshot, BrokerAdapterError>;

    /// Subscribe to tick updates for a symbol. Default no-op for adapters
    /// that don't need a push feed (e.g. the paper adapter polls instead).
    async fn subscribe_ticks(&mut self, _symbol: &str) -> Result<(), BrokerAdapterError> {
        Ok(())
    }
}
