//! Request and response types for all gex-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Gate refusal (403) â€” Patch L1
// ---------------------------------------------------------------------------

/// Response body when a daemon route is refused due to a gate check failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRefusedResponse {
    pub error: String,
    /// Which gate failed: "integrity_armed" | "risk_allowed" | "reconcile_clean"
    pub gate: String,
}

// ---------------------------------------------------------------------------
// /v1/integrity/arm  /v1/integrity/disarm
// ---------------------------------------------------------------------------

/// Response for integrity arm / disarm endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityResponse {
    /// true = armed (execution allowed), false = disarmed (execution blocked).
    pub armed: bool,
    /// Active run ID at the moment of the call (if any).
    pub active_run_id: Option<Uuid>,
    /// Current run-lifecycle state ("idle" | "running" | "halted").
    pub state: String,
}

// ---------------------------------------------------------------------------
// /v1/trading/* â€” DAEMON-1 (read-only, served from an injected snapshot)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAccountResponse {
    pub has_snapshot: bool,
    pub account: gex_schemas::BrokerAccount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPositionsResponse {
    pub has_snapshot: bool,
    pub positions: Vec<gex_schemas::BrokerPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingOrdersResponse {
    pub has_snapshot: bool,
    pub orders: Vec<gex_schemas::BrokerOrder>,
}

/// Fills are not carried on `BrokerSnapshot`; always empty until a fill feed
/// is wired. `has_snapshot` still reflects whether an account snapshot has
/// been injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingFillsResponse {
    pub has_snapshot: bool,
    pub fills: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSnapshotResponse {
    pub snapshot: Option<gex_schemas::BrokerSnapshot>,
}

// ---------------------------------------------------------------------------
// POST /v1/signal â€” producer ingress (spec Â§6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSubmitRequest {
    pub signal_id: String,
    pub profile_id: String,
    pub symbol: String,
    /// "BUY" | "SELL"
    pub direction: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub source: String,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSubmitResponse {
    pub accepted: bool,
    pub chain_id: Option<Uuid>,
    pub reason: Option<String>,
}
