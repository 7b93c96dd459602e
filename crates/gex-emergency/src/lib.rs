//! gex-emergency
//!
//! PATCH 08 – Data Integrity + Lookahead Protection
//!
//! Architectural decisions:
//! - No lookahead ever (reject incomplete bars)
//! - Fail on gap if gap_tolerance = 0
//! - Stale feed disarms system
//! - Feed disagreement policy enforced
//!
//! Pure deterministic logic. No IO, no wall-clock. Runtime provides now_tick and bar_end_ts.

mod arm_state; // Patch L7 — sticky disarm + fail-closed boot
mod calendar; // Patch B3 — session-aware gap detection
mod controller;
mod engine;
mod types;

pub use arm_state::{ArmState, DisarmReason}; // Patch L7
pub use calendar::{epoch_secs_to_ymd, CalendarSpec};
pub use controller::{
    ActorId, EmergencyConfig, EmergencyController, EmergencyTrigger, MarketSample,
    MitigatingAction, OpenPosition, RestoreError, RestoreVote, TransitionDecision,
};
pub use engine::{evaluate_bar, tick_feed};
pub use types::*;
