//! Order Router: deterministic execution boundary between the engine and
//! broker adapters.
//!
//! # Why this boundary exists
//! - Enforces separation of concerns between order sizing (RiskSizer) and
//!   order delivery (BrokerPool)
//! - Single choke-point for logging, metrics, and pre-flight validation
//! - Enables pluggable broker adapters (paper, live) without engine changes
//!
//! Every `BrokerAdapter` method takes a [`BrokerInvokeToken`][crate::gateway::BrokerInvokeToken]
//! that only `BrokerGateway` can manufacture, so the router can never be
//! driven except through the gateway's gate checks.

use crate::gateway::BrokerInvokeToken;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Broker-agnostic order submission request.
#[derive(Debug, Clone)]
pub struct BrokerSubmitRequest {
    pub order_id: String,
    pub symbol: String,
    /// Positive for buy, negative for sell.
    pub quantity: i32,
    pub order_type: String,
    /// Micros, when the order type needs one.
    pub limit_price: Option<i64>,
    pub time_in_force: String,
}

#[derive(Debug, Clone)]
pub struct BrokerSubmitResponse {
    pub broker_order_id: String,
    pub submitted_at: u64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct BrokerCancelResponse {
    pub broker_order_id: String,
    pub cancelled_at: u64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct BrokerReplaceRequest {
    pub broker_order_id: String,
    pub quantity: i32,
    pub limit_price: Option<i64>,
    pub time_in_force: String,
}

#[derive(Debug, Clone)]
pub struct BrokerReplaceResponse {
    pub broker_order_id: String,
    pub replaced_at: u64,
    pub status: String,
}

/// Implemented by every broker adapter (paper, live). The `token` parameter
/// proves the call was routed through `BrokerGateway`'s gate checks — it
/// cannot be constructed outside `gex-execution`.
pub trait BrokerAdapter {
    fn submit_order(
        &self,
        req: BrokerSubmitRequest,
        token: &BrokerInvokeToken,
    ) -> Result<BrokerSubmitResponse>;

    fn cancel_order(&self, broker_order_id: &str, token: &BrokerInvokeToken) -> Result<BrokerCancelResponse>;

    fn replace_order(
        &self,
        req: BrokerReplaceRequest,
        token: &BrokerInvokeToken,
    ) -> Result<BrokerReplaceResponse>;
}

/// Thin, `pub(crate)` boundary layer. Never re-exported: the only way
/// external code reaches a broker adapter is through `BrokerGateway`.
pub(crate) struct OrderRouter<B: BrokerAdapter> {
    broker: B,
}

impl<B: BrokerAdapter> OrderRouter<B> {
    pub(crate) fn new(broker: B) -> Self {
        Self { broker }
    }

    pub(crate) fn route_submit(
        &self,
        req: BrokerSubmitRequest,
        token: &BrokerInvokeToken,
    ) -> Result<BrokerSubmitResponse> {
        self.broker.submit_order(req, token)
    }

    pub(crate) fn route_cancel(
        &self,
        broker_order_id: &str,
        token: &BrokerInvokeToken,
    ) -> Result<BrokerCancelResponse> {
        self.broker.cancel_order(broker_order_id, token)
    }

    pub(crate) fn route_replace(
        &self,
        req: BrokerReplaceRequest,
        token: &BrokerInvokeToken,
    ) -> Result<BrokerReplaceResponse> {
        self.broker.replace_order(req, token)
    }
}
