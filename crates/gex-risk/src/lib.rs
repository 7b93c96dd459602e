//! RiskSizer — turns an admitted signal into a sized `OrderIntent` or a veto.
//!
//! Five pure steps (Kelly fraction, CVaR cap, hard caps, drawdown policy,
//! correlation veto), evaluated in order; deterministic with respect to its
//! `(request, snapshot, config)` inputs. No IO, no time, no broker calls.

mod engine;
mod types;

pub use engine::size;
pub use types::{
    DrawdownSignal, OpenPositionView, RiskConfig, RiskDecision, RiskRejectionReason, RiskSnapshot,
    RiskStepNote, SizingRequest, MICROS_SCALE,
};
