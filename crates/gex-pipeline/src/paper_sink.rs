//! `ExecutorSink` backed by the deterministic in-memory paper broker —
//! the sink the daemon wires up in PAPER mode, and the one gex-testkit
//! scenarios drive directly.

use std::sync::Mutex;

use gex_broker_paper::{buy, sell, PaperBroker};
use gex_reconcile::{OrderSnapshot, Side};

use crate::executor::{ExecutorSink, ExecutorSinkError};

#[derive(Default)]
pub struct PaperExecutorSink {
    broker: Mutex<PaperBroker>,
}

impl PaperExecutorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> gex_reconcile::BrokerSnapshot {
        self.broker.lock().expect("paper broker lock poisoned").snapshot().1
    }
}

#[async_trait::async_trait]
impl ExecutorSink for PaperExecutorSink {
    async fn submit(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: Side,
        qty: i64,
    ) -> Result<OrderSnapshot, ExecutorSinkError> {
        let req = match side {
            Side::Buy => buy(symbol, qty, client_order_id),
            Side::Sell => sell(symbol, qty, client_order_id),
        };
        let mut broker = self.broker.lock().expect("paper broker lock poisoned");
        let resp = broker.submit(req);
        Ok(resp.snapshot)
    }
}
