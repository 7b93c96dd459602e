//! Executor: the stage that turns an approved `RiskDecision` into a broker
//! order, applying the retry policy and writing `execution.*`/`position.*`
//! decision nodes (spec §4.3).
//!
//! Broker dispatch itself is injected through [`ExecutorSink`] so this
//! module stays broker-agnostic; the daemon currently wires
//! [`crate::paper_sink::PaperExecutorSink`]. A live sink backed by a broker
//! pool lease is not yet wired in.

use std::time::Duration;

use gex_reconcile::{OrderSnapshot, Side};
use thiserror::Error;

/// One broker dispatch attempt's outcome, already classified into the
/// retry-policy failure classes from spec §4.3.
#[derive(Debug, Error, Clone)]
pub enum ExecutorSinkError {
    #[error("network/timeout talking to broker: {0}")]
    NetworkOrTimeout(String),
    #[error("broker rejected order (margin/spread): {0}")]
    BrokerRejected(String),
    #[error("market is closed")]
    MarketClosed,
    #[error("connection lost mid-submit")]
    ConnectionLostMidSubmit,
}

#[async_trait::async_trait]
pub trait ExecutorSink: Send + Sync {
    /// Submit an order carrying `client_order_id` as its idempotency token.
    /// On `ConnectionLostMidSubmit`, the caller's retry re-invokes this with
    /// the SAME `client_order_id` so a conforming sink can look the order up
    /// by that token before creating a duplicate (spec §4.3: "idempotency
    /// for in-flight submits").
    async fn submit(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: Side,
        qty: i64,
    ) -> Result<OrderSnapshot, ExecutorSinkError>;
}

/// Terminal decision-node type emitted for one submit attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Opened(OrderSnapshot),
    FailedTransient,
    Rejected,
    MarketClosed,
    Reconciled(OrderSnapshot),
}

/// One retry-policy row (spec §4.3 table).
#[derive(Clone, Copy, Debug)]
struct RetryPlan {
    max_attempts: u32,
    backoff: &'static [Duration],
}

const NETWORK_TIMEOUT_PLAN: RetryPlan = RetryPlan {
    max_attempts: 3,
    backoff: &[Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)],
};

const CONNECTION_LOST_PLAN: RetryPlan = RetryPlan {
    max_attempts: 1,
    backoff: &[Duration::from_secs(2)],
};

/// Drive one order through the sink applying the spec §4.3 retry policy.
/// `sleep` is injected so tests can skip real delays.
pub async fn submit_with_retry<S, F, Fut>(
    sink: &S,
    client_order_id: &str,
    symbol: &str,
    side: Side,
    qty: i64,
    sleep: F,
) -> ExecutionOutcome
where
    S: ExecutorSink,
    F: Fn(Duration) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match sink.submit(client_order_id, symbol, side, qty).await {
            Ok(snap) => return ExecutionOutcome::Opened(snap),
            Err(ExecutorSinkError::BrokerRejected(_)) => return ExecutionOutcome::Rejected,
            Err(ExecutorSinkError::MarketClosed) => return ExecutionOutcome::MarketClosed,
            Err(ExecutorSinkError::ConnectionLostMidSubmit) => {
                if attempt > CONNECTION_LOST_PLAN.max_attempts {
                    return ExecutionOutcome::FailedTransient;
                }
                sleep(CONNECTION_LOST_PLAN.backoff[0]).await;
                // Idempotent retry: the sink is expected to find the order it
                // already placed under `client_order_id` and return it as a
                // reconciled snapshot rather than double-submitting.
                match sink.submit(client_order_id, symbol, side, qty).await {
                    Ok(snap) => return ExecutionOutcome::Reconciled(snap),
                    Err(_) => return ExecutionOutcome::FailedTransient,
                }
            }
            Err(ExecutorSinkError::NetworkOrTimeout(_)) => {
                if attempt >= NETWORK_TIMEOUT_PLAN.max_attempts {
                    return ExecutionOutcome::FailedTransient;
                }
                let delay = NETWORK_TIMEOUT_PLAN.backoff[(attempt - 1) as usize];
                sleep(delay).await;
            }
        }
    }
}
