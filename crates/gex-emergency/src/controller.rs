//! Emergency controller: flash-crash / vol-spike / spread-explosion /
//! drawdown / manual-kill triggers and the kill-switch restore quorum.
//!
//! Pure deterministic logic, same discipline as [`crate::arm_state`] and
//! [`crate::engine`]: no IO, no wall clock. Callers supply epoch-second
//! timestamps and market/portfolio snapshots; the controller only ever
//! decides, it never calls a broker. Mitigating actions come back as data
//! ([`MitigatingAction`]) for the caller (Executor/BrokerPool) to carry out,
//! and as a [`TransitionDecision`] for the caller to fold into a decision
//! chain (`emergency.*` nodes).

use gex_schemas::EmergencyStateKind;
use std::collections::BTreeSet;

/// Identifies an actor taking emergency action (manual kill, restore vote).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }
}

/// A single market observation for one symbol, enough to evaluate all four
/// automatic triggers. `*_micros` fields share the portfolio's fixed-point
/// scale (1e-6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketSample {
    pub symbol: String,
    pub price_micros: i64,
    pub price_60s_ago_micros: i64,
    pub realized_vol_micros: i64,
    pub atr_20_micros: i64,
    pub spread_micros: i64,
    pub spread_median_1h_micros: i64,
}

/// An open position, as seen by the controller for panic-hedge sizing.
/// `qty` is signed: positive is long, negative is short.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenPosition {
    pub symbol: String,
    pub qty: i64,
}

/// Tunables for the five triggers in the spec's trigger table, plus the
/// restore-quorum window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmergencyConfig {
    /// Flash-crash threshold, as a fraction in micros-of-1 (2% = 20_000).
    pub flash_crash_fraction_micros: i64,
    /// Realized-vol-over-ATR multiplier triggering a vol-spike halt.
    pub vol_multiplier: i64,
    /// Spread-over-1h-median multiplier triggering a spread-explosion halt.
    pub spread_multiplier: i64,
    /// Peak-to-trough drawdown fraction (micros-of-1) triggering a kill.
    pub drawdown_kill_fraction_micros: i64,
    /// Window, in seconds, within which two distinct Owner restore votes
    /// both count toward the killed -> normal quorum.
    pub restore_quorum_window_s: i64,
}

impl EmergencyConfig {
    pub fn sane_defaults() -> Self {
        Self {
            flash_crash_fraction_micros: 20_000,    // 2%
            vol_multiplier: 3,
            spread_multiplier: 10,
            drawdown_kill_fraction_micros: 150_000, // 15%
            restore_quorum_window_s: 300,
        }
    }
}

/// The trigger that produced a [`TransitionDecision`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmergencyTrigger {
    FlashCrash {
        symbol: String,
        move_fraction_micros: i64,
    },
    VolatilitySpike {
        symbol: String,
        vol_over_atr_micros: i64,
    },
    SpreadExplosion {
        symbol: String,
        spread_over_median_micros: i64,
    },
    PortfolioDrawdown {
        drawdown_fraction_micros: i64,
    },
    ManualKill {
        actor: ActorId,
    },
    QuorumRestore {
        actors: Vec<ActorId>,
    },
    OwnerRestore {
        actor: ActorId,
    },
}

/// A concrete mitigating action the caller must carry out against the
/// BrokerPool/Executor. The controller only describes these; it never
/// performs them itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MitigatingAction {
    OpenCounterPosition { symbol: String, qty: i64 },
    RejectNewIntents,
    CancelAllLimitOrders,
    CloseAllPositions,
}

/// A state transition, ready to become an `emergency.*` decision-chain node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionDecision {
    pub from: EmergencyStateKind,
    pub to: EmergencyStateKind,
    pub trigger: EmergencyTrigger,
    pub mitigating_actions: Vec<MitigatingAction>,
}

/// A single vote toward restoring a `killed` controller to `normal`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreVote {
    pub actor: ActorId,
    pub is_owner: bool,
    pub cast_at_epoch_s: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreError {
    /// Restore attempted while the controller wasn't in the state the
    /// method expects (e.g. a quorum vote while not `killed`).
    WrongState { actual: EmergencyStateKind },
    /// The acting actor lacks Owner capability.
    InsufficientCapability,
}

fn severity(state: EmergencyStateKind) -> u8 {
    match state {
        EmergencyStateKind::Normal => 0,
        EmergencyStateKind::Hedged => 1,
        EmergencyStateKind::Halted => 2,
        EmergencyStateKind::Killed => 3,
    }
}

/// Holds the current [`EmergencyStateKind`] and any pending restore votes.
/// `evaluate` only ever escalates; recovery is exclusively through
/// `restore_from_owner` (Hedged/Halted -> Normal) or `cast_restore_vote`
/// (Killed -> Normal, two distinct Owner actors required).
pub struct EmergencyController {
    state: EmergencyStateKind,
    pending_restore_votes: Vec<RestoreVote>,
}

impl EmergencyController {
    /// A freshly constructed controller always starts `Normal`. Killed
    /// state is never implicitly inherited across a process restart
    /// without a persisted record — the same fail-closed discipline as
    /// `ArmState::boot`, just applied in the opposite direction: nothing
    /// here is trusted to auto-escalate either.
    pub fn new() -> Self {
        Self {
            state: EmergencyStateKind::Normal,
            pending_restore_votes: Vec::new(),
        }
    }

    pub fn state(&self) -> EmergencyStateKind {
        self.state
    }

    /// Evaluate one round of market samples and portfolio drawdown against
    /// the trigger table. Checks drawdown first since it is the most
    /// severe outcome; within a round, the first sample to trip a trigger
    /// wins (samples are expected to be called once per tick, not batched
    /// across an entire session).
    ///
    /// A transition only fires if it would escalate the controller's
    /// severity; a trigger that would hold state at or below the current
    /// severity is a no-op (e.g. a vol spike while already `killed`).
    pub fn evaluate(
        &mut self,
        cfg: &EmergencyConfig,
        samples: &[MarketSample],
        positions: &[OpenPosition],
        drawdown_fraction_micros: i64,
    ) -> Option<TransitionDecision> {
        if drawdown_fraction_micros >= cfg.drawdown_kill_fraction_micros {
            return self.transition(
                EmergencyStateKind::Killed,
                EmergencyTrigger::PortfolioDrawdown {
                    drawdown_fraction_micros,
                },
                vec![MitigatingAction::CloseAllPositions, MitigatingAction::RejectNewIntents],
            );
        }

        for s in samples {
            let move_fraction_micros = signed_fraction(s.price_60s_ago_micros, s.price_micros);
            if move_fraction_micros.abs() >= cfg.flash_crash_fraction_micros {
                let actions = positions
                    .iter()
                    .map(|p| MitigatingAction::OpenCounterPosition {
                        symbol: p.symbol.clone(),
                        qty: -p.qty,
                    })
                    .collect();
                if let Some(d) = self.transition(
                    EmergencyStateKind::Hedged,
                    EmergencyTrigger::FlashCrash {
                        symbol: s.symbol.clone(),
                        move_fraction_micros,
                    },
                    actions,
                ) {
                    return Some(d);
                }
                continue;
            }

            if s.atr_20_micros > 0 && s.realized_vol_micros >= cfg.vol_multiplier * s.atr_20_micros {
                if let Some(d) = self.transition(
                    EmergencyStateKind::Halted,
                    EmergencyTrigger::VolatilitySpike {
                        symbol: s.symbol.clone(),
                        vol_over_atr_micros: s.realized_vol_micros,
                    },
                    vec![MitigatingAction::RejectNewIntents],
                ) {
                    return Some(d);
                }
                continue;
            }

            if s.spread_median_1h_micros > 0
                && s.spread_micros >= cfg.spread_multiplier * s.spread_median_1h_micros
            {
                if let Some(d) = self.transition(
                    EmergencyStateKind::Halted,
                    EmergencyTrigger::SpreadExplosion {
                        symbol: s.symbol.clone(),
                        spread_over_median_micros: s.spread_micros,
                    },
                    vec![MitigatingAction::CancelAllLimitOrders],
                ) {
                    return Some(d);
                }
            }
        }

        None
    }

    /// Raises the controller to `halted` in response to the risk layer's
    /// own drawdown veto (RiskSizer vetoes new size at its configured
    /// `dd_halt_threshold` and raises Emergency to `halted`). This is
    /// deliberately a less severe outcome than [`Self::evaluate`]'s own
    /// `drawdown_kill_fraction_micros` trigger, which kills outright — the
    /// risk layer's threshold is checked per-signal and fires earlier.
    pub fn raise_halt_from_risk_veto(&mut self, drawdown_fraction_micros: i64) -> Option<TransitionDecision> {
        self.transition(
            EmergencyStateKind::Halted,
            EmergencyTrigger::PortfolioDrawdown {
                drawdown_fraction_micros,
            },
            vec![MitigatingAction::RejectNewIntents],
        )
    }

    /// Any authorized actor can trigger a manual kill from any state.
    pub fn manual_kill(&mut self, actor: ActorId) -> TransitionDecision {
        let from = self.state;
        self.state = EmergencyStateKind::Killed;
        self.pending_restore_votes.clear();
        TransitionDecision {
            from,
            to: EmergencyStateKind::Killed,
            trigger: EmergencyTrigger::ManualKill { actor },
            mitigating_actions: vec![
                MitigatingAction::CloseAllPositions,
                MitigatingAction::RejectNewIntents,
            ],
        }
    }

    /// Restores `hedged`/`halted` back to `normal`. Reversal of a
    /// `normal -> {hedged, halted}` transition requires Owner capability;
    /// a single Owner actor is sufficient (unlike the killed quorum).
    pub fn restore_from_owner(&mut self, actor: ActorId, is_owner: bool) -> Result<TransitionDecision, RestoreError> {
        if !matches!(self.state, EmergencyStateKind::Hedged | EmergencyStateKind::Halted) {
            return Err(RestoreError::WrongState { actual: self.state });
        }
        if !is_owner {
            return Err(RestoreError::InsufficientCapability);
        }
        let from = self.state;
        self.state = EmergencyStateKind::Normal;
        Ok(TransitionDecision {
            from,
            to: EmergencyStateKind::Normal,
            trigger: EmergencyTrigger::OwnerRestore { actor },
            mitigating_actions: vec![],
        })
    }

    /// Casts a restore vote toward lifting `killed`. `killed -> normal`
    /// requires two distinct Owner-capable actors to vote within
    /// `cfg.restore_quorum_window_s` of each other; a single actor voting
    /// twice does not satisfy the quorum.
    pub fn cast_restore_vote(
        &mut self,
        cfg: &EmergencyConfig,
        vote: RestoreVote,
    ) -> Result<Option<TransitionDecision>, RestoreError> {
        if self.state != EmergencyStateKind::Killed {
            return Err(RestoreError::WrongState { actual: self.state });
        }
        if !vote.is_owner {
            return Err(RestoreError::InsufficientCapability);
        }

        self.pending_restore_votes
            .retain(|v| (vote.cast_at_epoch_s - v.cast_at_epoch_s).abs() <= cfg.restore_quorum_window_s);

        if !self.pending_restore_votes.iter().any(|v| v.actor == vote.actor) {
            self.pending_restore_votes.push(vote);
        }

        let distinct: BTreeSet<&ActorId> =
            self.pending_restore_votes.iter().map(|v| &v.actor).collect();

        if distinct.len() >= 2 {
            let actors: Vec<ActorId> = self.pending_restore_votes.iter().map(|v| v.actor.clone()).collect();
            self.state = EmergencyStateKind::Normal;
            self.pending_restore_votes.clear();
            Ok(Some(TransitionDecision {
                from: EmergencyStateKind::Killed,
                to: EmergencyStateKind::Normal,
                trigger: EmergencyTrigger::QuorumRestore { actors },
                mitigating_actions: vec![],
            }))
        } else {
            Ok(None)
        }
    }

    fn transition(
        &mut self,
        to: EmergencyStateKind,
        trigger: EmergencyTrigger,
        mitigating_actions: Vec<MitigatingAction>,
    ) -> Option<TransitionDecision> {
        if severity(to) <= severity(self.state) {
            return None;
        }
        let from = self.state;
        self.state = to;
        Some(TransitionDecision {
            from,
            to,
            trigger,
            mitigating_actions,
        })
    }
}

impl Default for EmergencyController {
    fn default() -> Self {
        Self::new()
    }
}

/// `(new - old) / old`, expressed as a fraction in micros-of-1. Returns 0
/// when `old` is non-positive (can't express a meaningful move).
fn signed_fraction(old: i64, new: i64) -> i64 {
    if old <= 0 {
        return 0;
    }
    ((new - old) as i128 * 1_000_000 / old as i128) as i64
}
