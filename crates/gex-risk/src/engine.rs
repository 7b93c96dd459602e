//! RiskSizer: transforms an admitted signal into a sized `OrderIntent` or a
//! veto. Five pure steps, evaluated in the order named by the contract,
//! each producing a decision-node note; the first veto is terminal.

use crate::types::{
    DrawdownSignal, RiskConfig, RiskDecision, RiskRejectionReason, RiskSnapshot, RiskStepNote,
    SizingRequest,
};

/// 95% one-tailed normal CVaR factor: E[X | X < -z] for X ~ N(0,1) at the
/// 5% tail. Used as a fixed, deterministic proxy for tail loss — the sizer
/// has no access to empirical return distributions, only SL distance as a
/// volatility stand-in.
const CVAR95_Z: f64 = 2.063;

fn lot_quantize(volume_micros: i64, lot_step_micros: i64) -> i64 {
    if lot_step_micros <= 0 {
        return volume_micros.max(0);
    }
    (volume_micros / lot_step_micros) * lot_step_micros
}

/// Step 1: Kelly fraction. Returns the fraction of equity to risk, already
/// scaled and clipped to `[0, max_total_risk_fraction]`.
fn kelly_fraction(req: &SizingRequest, cfg: &RiskConfig) -> Result<f64, RiskRejectionReason> {
    let sl_distance = (req.entry_price_micros - req.stop_loss_micros).abs();
    let tp_distance = (req.take_profit_micros - req.entry_price_micros).abs();

    if sl_distance == 0 {
        return Err(RiskRejectionReason::BadInput {
            detail: "stop_loss equals entry_price".to_string(),
        });
    }
    if req.confidence < cfg.kelly_min_confidence {
        return Ok(0.0);
    }

    let p = req.confidence.clamp(0.0, 1.0);
    let q = 1.0 - p;
    let b = tp_distance as f64 / sl_distance as f64;
    if b <= 0.0 {
        return Err(RiskRejectionReason::BadInput {
            detail: "non-positive payoff ratio".to_string(),
        });
    }

    let f_raw = (p * b - q) / b;
    let scaled = (f_raw * cfg.kelly_scale).max(0.0);
    Ok(scaled.min(cfg.max_total_risk_fraction))
}

/// Per-unit risk proxy: fraction of price lost if stopped out.
fn risk_fraction_of_price(req: &SizingRequest) -> f64 {
    let sl_distance = (req.entry_price_micros - req.stop_loss_micros).abs() as f64;
    sl_distance / req.entry_price_micros.max(1) as f64
}

/// Step 2: reduce notional, if needed, so that total portfolio CVaR stays
/// within `max_cvar_fraction · equity`. Vetoes if no positive size fits.
fn apply_cvar_cap(
    notional_micros: i64,
    vol: f64,
    snapshot: &RiskSnapshot,
    cfg: &RiskConfig,
) -> Result<i64, RiskRejectionReason> {
    let existing_cvar: f64 = snapshot
        .open_positions
        .iter()
        .map(|p| CVAR95_Z * p.volatility * p.notional_micros as f64)
        .sum();

    let cap = cfg.max_cvar_fraction * snapshot.equity_micros as f64;
    let headroom = cap - existing_cvar;
    if headroom <= 0.0 {
        return Err(RiskRejectionReason::CvarExceeded);
    }

    let candidate_cvar = CVAR95_Z * vol * notional_micros as f64;
    if candidate_cvar <= headroom {
        return Ok(notional_micros);
    }

    let scale = headroom / candidate_cvar;
    let reduced = (notional_micros as f64 * scale) as i64;
    if reduced <= 0 {
        return Err(RiskRejectionReason::CvarExceeded);
    }
    Ok(reduced)
}

/// RiskSizer::size — spec §4.2.
pub fn size(req: &SizingRequest, snapshot: &RiskSnapshot, cfg: &RiskConfig) -> RiskDecision {
    let mut notes = Vec::new();

    // Step 1: Kelly fraction.
    let f = match kelly_fraction(req, cfg) {
        Ok(f) => f,
        Err(reason) => {
            notes.push(RiskStepNote {
                step: "kelly",
                detail: format!("{reason:?}"),
            });
            return RiskDecision::Rejected { reason, notes };
        }
    };
    if f <= 0.0 {
        notes.push(RiskStepNote {
            step: "kelly",
            detail: "kelly fraction resolved to zero edge".to_string(),
        });
        return RiskDecision::Rejected {
            reason: RiskRejectionReason::NoEdge,
            notes,
        };
    }
    let requested_notional = (f * snapshot.equity_micros as f64) as i64;
    notes.push(RiskStepNote {
        step: "kelly",
        detail: format!("f={f:.4} requested_notional_micros={requested_notional}"),
    });

    // Step 2: CVaR cap.
    let vol = risk_fraction_of_price(req);
    let after_cvar = match apply_cvar_cap(requested_notional, vol, snapshot, cfg) {
        Ok(v) => v,
        Err(reason) => {
            notes.push(RiskStepNote {
                step: "cvar",
                detail: format!("{reason:?}"),
            });
            return RiskDecision::Rejected { reason, notes };
        }
    };
    let was_cvar_reduced = after_cvar < requested_notional;
    notes.push(RiskStepNote {
        step: "cvar",
        detail: format!("notional_micros={after_cvar} reduced={was_cvar_reduced}"),
    });

    // Step 3: hard caps (risk-per-trade, max positions).
    if snapshot.open_position_count() >= cfg.max_positions {
        notes.push(RiskStepNote {
            step: "hard_caps",
            detail: "max_positions reached".to_string(),
        });
        return RiskDecision::Rejected {
            reason: RiskRejectionReason::MaxPositionsReached,
            notes,
        };
    }
    let risk_per_trade = after_cvar as f64 * vol;
    let risk_cap = cfg.max_risk_per_trade_fraction * snapshot.equity_micros as f64;
    let mut volume = if risk_per_trade > risk_cap && risk_per_trade > 0.0 {
        ((after_cvar as f64) * (risk_cap / risk_per_trade)) as i64
    } else {
        after_cvar
    };
    if volume <= 0 {
        notes.push(RiskStepNote {
            step: "hard_caps",
            detail: "risk_per_trade cap leaves no size".to_string(),
        });
        return RiskDecision::Rejected {
            reason: RiskRejectionReason::RiskPerTradeExceeded,
            notes,
        };
    }
    notes.push(RiskStepNote {
        step: "hard_caps",
        detail: format!("volume_micros={volume}"),
    });

    // Step 4: drawdown policy.
    let dd_signal = if snapshot.drawdown_fraction >= cfg.dd_halt_threshold {
        DrawdownSignal::Halt
    } else if snapshot.drawdown_fraction >= cfg.dd_reduce_threshold {
        DrawdownSignal::Reduce
    } else {
        DrawdownSignal::None
    };
    match dd_signal {
        DrawdownSignal::Halt => {
            notes.push(RiskStepNote {
                step: "drawdown",
                detail: format!("drawdown={:.4} >= halt_threshold", snapshot.drawdown_fraction),
            });
            return RiskDecision::Rejected {
                reason: RiskRejectionReason::DrawdownHalt,
                notes,
            };
        }
        DrawdownSignal::Reduce => {
            volume /= 2;
            notes.push(RiskStepNote {
                step: "drawdown",
                detail: format!("drawdown={:.4} >= reduce_threshold, halved", snapshot.drawdown_fraction),
            });
        }
        DrawdownSignal::None => {}
    }

    // Step 5: correlation veto.
    for pos in &snapshot.open_positions {
        if let Some(rho) = snapshot.correlation_with(&req.symbol, &pos.symbol) {
            if rho.abs() > cfg.max_correlation {
                notes.push(RiskStepNote {
                    step: "correlation",
                    detail: format!("{} vs {} rho={:.3}", req.symbol, pos.symbol, rho),
                });
                return RiskDecision::Rejected {
                    reason: RiskRejectionReason::CorrelationVeto {
                        other_symbol: pos.symbol.clone(),
                        rho,
                    },
                    notes,
                };
            }
        }
    }

    let final_volume = lot_quantize(volume, 1);
    if final_volume <= 0 {
        notes.push(RiskStepNote {
            step: "final",
            detail: "quantized volume is zero".to_string(),
        });
        return RiskDecision::Rejected {
            reason: RiskRejectionReason::RiskPerTradeExceeded,
            notes,
        };
    }

    if final_volume < requested_notional {
        RiskDecision::Reduced {
            requested_volume_micros: requested_notional,
            volume_micros: final_volume,
            notes,
        }
    } else {
        RiskDecision::Approved {
            volume_micros: final_volume,
            notes,
        }
    }
}
