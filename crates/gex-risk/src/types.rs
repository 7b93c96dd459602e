/// 1e-6 fixed-point scale used for equity and volume fields.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Re-exported so callers can build a sizer without an extra crate import.
pub use gex_config::RiskConfig;

/// What RiskSizer was asked to approve.
#[derive(Clone, Debug, PartialEq)]
pub struct SizingRequest {
    pub symbol: String,
    /// Producer confidence in `[0, 1]`.
    pub confidence: f64,
    pub entry_price_micros: i64,
    pub stop_loss_micros: i64,
    pub take_profit_micros: i64,
    pub is_buy: bool,
}

/// Why a request was vetoed. One variant per spec §4.2 step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RiskRejectionReason {
    /// Kelly fraction resolved to zero or negative edge.
    NoEdge,
    /// No positive size keeps portfolio CVaR within `max_cvar_fraction`.
    CvarExceeded,
    /// `risk_per_trade` would exceed `max_risk_per_trade_fraction · equity`.
    RiskPerTradeExceeded,
    /// Open position count is already at `max_positions`.
    MaxPositionsReached,
    /// Drawdown is at or beyond `dd_halt_threshold`.
    DrawdownHalt,
    /// A correlated open position exceeds `max_correlation`.
    CorrelationVeto { other_symbol: String, rho: f64 },
    /// Malformed input the caller should never have produced.
    BadInput { detail: String },
}

/// One step's emitted decision-node payload (spec §4.2: "all steps produce
/// decision nodes"). The caller (SignalGate/Pipeline) persists these as
/// `DecisionNode`s; the sizer itself is pure and does no IO.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskStepNote {
    pub step: &'static str,
    pub detail: String,
}

/// Outcome of `RiskSizer::size`.
#[derive(Clone, Debug, PartialEq)]
pub enum RiskDecision {
    /// Full requested size approved.
    Approved {
        volume_micros: i64,
        notes: Vec<RiskStepNote>,
    },
    /// Size was reduced (CVaR or drawdown policy); still tradeable.
    Reduced {
        requested_volume_micros: i64,
        volume_micros: i64,
        notes: Vec<RiskStepNote>,
    },
    /// Vetoed; no order is placed.
    Rejected {
        reason: RiskRejectionReason,
        notes: Vec<RiskStepNote>,
    },
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved { .. } | RiskDecision::Reduced { .. })
    }

    pub fn volume_micros(&self) -> Option<i64> {
        match self {
            RiskDecision::Approved { volume_micros, .. } => Some(*volume_micros),
            RiskDecision::Reduced { volume_micros, .. } => Some(*volume_micros),
            RiskDecision::Rejected { .. } => None,
        }
    }

    pub fn notes(&self) -> &[RiskStepNote] {
        match self {
            RiskDecision::Approved { notes, .. } => notes,
            RiskDecision::Reduced { notes, .. } => notes,
            RiskDecision::Rejected { notes, .. } => notes,
        }
    }
}

/// Whether the drawdown halt step should raise Emergency State.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawdownSignal {
    None,
    Reduce,
    Halt,
}

/// A minimal, CVaR-estimable view of one open position, lifted from
/// `gex_portfolio::ProfileState` at the call site so this crate stays
/// decoupled from the portfolio ledger's internal representation.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenPositionView {
    pub symbol: String,
    pub notional_micros: i64,
    /// Annualized return volatility estimate, `[0, ...)`.
    pub volatility: f64,
}

/// Snapshot of profile state `RiskSizer` needs: equity, drawdown, open
/// positions, and correlation lookups. Taken once at entry (spec §4.2:
/// "reads profile state through a snapshot taken at entry").
#[derive(Clone, Debug, PartialEq)]
pub struct RiskSnapshot {
    pub equity_micros: i64,
    pub drawdown_fraction: f64,
    pub open_positions: Vec<OpenPositionView>,
    /// Symmetric pairwise correlation, `(symbol, symbol) -> rho`.
    pub correlations: std::collections::BTreeMap<(String, String), f64>,
}

impl RiskSnapshot {
    pub fn open_position_count(&self) -> u32 {
        self.open_positions.len() as u32
    }

    pub fn correlation_with(&self, a: &str, b: &str) -> Option<f64> {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.correlations.get(&key).copied()
    }
}
