//! SignalGate — the single ingress for trade proposals. Five ordered
//! checks; the first failure is terminal (spec §4.1).

use gex_portfolio::ProfileState;
use gex_schemas::{Direction, EmergencyStateKind, Signal};
use uuid::Uuid;

use crate::types::{GateOutcome, GateRefusal, ProfileBlockCause, ProfileHealth};

/// Everything `submit` needs beyond the signal itself and the mutable
/// per-profile state it checks against.
pub struct GateContext<'a> {
    pub signal: &'a Signal,
    pub now_ms: i64,
    pub emergency_state: EmergencyStateKind,
    pub profile: &'a ProfileHealth,
    pub min_confidence: f64,
    pub rate_limit_per_minute: u32,
    /// Critical-tier producers are exempt from rate limiting (spec §4.1).
    pub rate_limit_exempt: bool,
}

fn validate_schema(signal: &Signal, min_confidence: f64) -> Result<(), GateRefusal> {
    if signal.symbol.trim().is_empty() {
        return Err(GateRefusal::InvalidSchema {
            detail: "empty symbol".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&signal.confidence) {
        return Err(GateRefusal::InvalidSchema {
            detail: "confidence out of [0,1]".to_string(),
        });
    }
    if signal.confidence < min_confidence {
        return Err(GateRefusal::InvalidSchema {
            detail: format!("confidence below min_confidence={min_confidence}"),
        });
    }
    let entry = signal.entry_price_micros;
    let sl = signal.stop_loss_micros;
    let tp = signal.take_profit_micros;
    let ok_sides = match signal.direction {
        Direction::Buy => sl < entry && entry < tp,
        Direction::Sell => tp < entry && entry < sl,
    };
    if !ok_sides {
        return Err(GateRefusal::InvalidSchema {
            detail: "stop_loss/take_profit not on correct side of entry_price".to_string(),
        });
    }
    Ok(())
}

/// Runs the five checks against mutable `state`, allocating a new chain id
/// on fresh admission. `state` is the profile's single-writer snapshot;
/// callers must serialize calls per profile to preserve FIFO order
/// (Testable Property 2).
pub fn submit(ctx: &GateContext<'_>, state: &mut ProfileState) -> GateOutcome {
    // Check 1: idempotency.
    if let Some((chain_id, accepted)) = state.check_idempotent(&ctx.signal.signal_id, ctx.now_ms) {
        return GateOutcome::Duplicate { chain_id, accepted };
    }

    // Check 2: rate limit (critical tier exempt).
    if !ctx.rate_limit_exempt {
        let window = state.rate_window_for(
            &ctx.signal.source,
            ctx.rate_limit_per_minute,
            ctx.rate_limit_per_minute,
            ctx.now_ms,
        );
        if !window.try_take(ctx.now_ms) {
            let chain_id = Uuid::new_v4();
            state.record_signal(&ctx.signal.signal_id, chain_id, false, ctx.now_ms);
            return GateOutcome::Refused {
                refusal: GateRefusal::RateLimited,
            };
        }
    }

    // Check 3: schema/range.
    if let Err(refusal) = validate_schema(ctx.signal, ctx.min_confidence) {
        let chain_id = Uuid::new_v4();
        state.record_signal(&ctx.signal.signal_id, chain_id, false, ctx.now_ms);
        return GateOutcome::Refused { refusal };
    }

    // Check 4: emergency state.
    if ctx.emergency_state != EmergencyStateKind::Normal {
        let chain_id = Uuid::new_v4();
        state.record_signal(&ctx.signal.signal_id, chain_id, false, ctx.now_ms);
        return GateOutcome::Refused {
            refusal: GateRefusal::EmergencyBlocked {
                state: ctx.emergency_state,
            },
        };
    }

    // Check 5: profile state.
    if !ctx.profile.exists {
        let chain_id = Uuid::new_v4();
        state.record_signal(&ctx.signal.signal_id, chain_id, false, ctx.now_ms);
        return GateOutcome::Refused {
            refusal: GateRefusal::ProfileBlocked {
                cause: ProfileBlockCause::Unknown,
            },
        };
    }
    if !ctx.profile.trading_enabled {
        let chain_id = Uuid::new_v4();
        state.record_signal(&ctx.signal.signal_id, chain_id, false, ctx.now_ms);
        return GateOutcome::Refused {
            refusal: GateRefusal::ProfileBlocked {
                cause: ProfileBlockCause::TradingDisabled,
            },
        };
    }
    if !ctx.profile.connection_healthy {
        let chain_id = Uuid::new_v4();
        state.record_signal(&ctx.signal.signal_id, chain_id, false, ctx.now_ms);
        return GateOutcome::Refused {
            refusal: GateRefusal::ProfileBlocked {
                cause: ProfileBlockCause::ConnectionUnhealthy,
            },
        };
    }

    let chain_id = Uuid::new_v4();
    state.record_signal(&ctx.signal.signal_id, chain_id, true, ctx.now_ms);
    GateOutcome::Admitted { chain_id }
}
