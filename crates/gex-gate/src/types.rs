use gex_schemas::EmergencyStateKind;
use uuid::Uuid;

/// Why a signal was refused at the gate. One variant per check in the
/// five-check table (spec §4.1); `Duplicate` is a non-rejection short
/// circuit (the signal is re-acknowledged, not refused).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateRefusal {
    RateLimited,
    InvalidSchema { detail: String },
    EmergencyBlocked { state: EmergencyStateKind },
    ProfileBlocked { cause: ProfileBlockCause },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileBlockCause {
    Unknown,
    TradingDisabled,
    ConnectionUnhealthy,
}

impl std::fmt::Display for GateRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRefusal::RateLimited => write!(f, "GATE_RATE_LIMITED"),
            GateRefusal::InvalidSchema { detail } => write!(f, "GATE_INVALID_SCHEMA: {detail}"),
            GateRefusal::EmergencyBlocked { state } => {
                write!(f, "GATE_BLOCKED: emergency state is {state:?}")
            }
            GateRefusal::ProfileBlocked { cause } => write!(f, "GATE_BLOCKED: {cause:?}"),
        }
    }
}

impl std::error::Error for GateRefusal {}

/// Outcome of `SignalGate::submit`.
#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    /// Newly admitted: a chain id has been allocated.
    Admitted { chain_id: Uuid },
    /// `(profile_id, signal_id)` was seen within the idempotency window;
    /// the caller gets back the prior chain's id and acceptance.
    Duplicate { chain_id: Uuid, accepted: bool },
    /// Refused by one of checks 2–5.
    Refused { refusal: GateRefusal },
}

impl GateOutcome {
    pub fn accepted(&self) -> bool {
        match self {
            GateOutcome::Admitted { .. } => true,
            GateOutcome::Duplicate { accepted, .. } => *accepted,
            GateOutcome::Refused { .. } => false,
        }
    }

    pub fn chain_id(&self) -> Option<Uuid> {
        match self {
            GateOutcome::Admitted { chain_id } => Some(*chain_id),
            GateOutcome::Duplicate { chain_id, .. } => Some(*chain_id),
            GateOutcome::Refused { .. } => None,
        }
    }
}

/// Profile-side facts check 5 needs, independent of the full portfolio ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileHealth {
    pub exists: bool,
    pub trading_enabled: bool,
    pub connection_healthy: bool,
}

impl ProfileHealth {
    pub fn healthy() -> Self {
        Self {
            exists: true,
            trading_enabled: true,
            connection_healthy: true,
        }
    }
}
