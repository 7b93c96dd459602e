//! gex-execution — Executor: turns approved `OrderIntent`s into broker
//! orders through the single `BrokerGateway` choke-point, and tracks each
//! live order's lifecycle with an explicit OMS state machine.

mod engine;
mod gateway;
mod id_map;
mod oms;
mod order_router;
mod prices;
mod reconcile_guard;
mod types;

pub use engine::targets_to_order_intents;
pub use gateway::{
    intent_id_to_client_order_id, BrokerGateway, BrokerInvokeToken, GateRefusal, IntegrityGate,
    OutboxClaimToken, ReconcileGate, RiskGate, UnknownOrder,
};
pub use id_map::BrokerOrderMap;
pub use oms::{OmsEvent, OmsOrder, OrderState, TransitionError};
pub use order_router::{
    BrokerAdapter, BrokerCancelResponse, BrokerReplaceRequest, BrokerReplaceResponse,
    BrokerSubmitRequest, BrokerSubmitResponse,
};
pub use prices::{micros_to_price, price_to_micros, PricingError, MICROS_PER_UNIT};
pub use reconcile_guard::ReconcileFreshnessGuard;
pub use types::{ExecutionDecision, OrderIntent, Side, StrategyOutput, TargetPosition};

use std::collections::BTreeMap;

/// Current positions, keyed by symbol. Signed quantity: +long, -short.
pub type PositionBook = BTreeMap<String, i64>;

/// Build a `PositionBook` with minimal boilerplate in tests/callers.
pub fn position_book<I, S>(items: I) -> PositionBook
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<String>,
{
    let mut book = PositionBook::new();
    for (sym, qty) in items {
        book.insert(sym.into(), qty);
    }
    book
}
