//! Wire-level DTOs shared by every crate in the gateway: the producer
//! ingress shape, decision chain nodes, broker snapshots, and positions.
//! Money and quantities are carried as fixed-point micros (`i64`), never
//! floats — see `MICROS_SCALE`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 1e-6 fixed-point scale used for equity, volume, and price fields.
pub const MICROS_SCALE: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Signal ingress (spec §6 "Producer ingress")
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

/// Producer rate-limit tier. Carried on the signal, not inferred from content
/// (Open Question in spec §9: tier is a property of producer identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerTier {
    Normal,
    High,
    Critical,
}

impl Default for ProducerTier {
    fn default() -> Self {
        ProducerTier::Normal
    }
}

/// A trade proposal as received from a producer. Immutable after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Opaque producer-chosen key, unique per (profile, 24h window).
    pub signal_id: String,
    pub profile_id: String,
    pub symbol: String,
    pub direction: Direction,
    /// Confidence in [0,1].
    pub confidence: f64,
    pub entry_price_micros: i64,
    pub stop_loss_micros: i64,
    pub take_profit_micros: i64,
    pub source: String,
    pub producer_tier: ProducerTier,
    pub submitted_at: DateTime<Utc>,
}

/// Response to `submit(signal)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub chain_id: Uuid,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Decision chain (spec §3 "Decision Chain" / "Decision Node", §4.6 Provenance)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainOutcome {
    Executed,
    Rejected,
    Blocked,
    Overridden,
}

/// One step in a signal's decision chain. `hash` covers
/// `type ∥ parent_hash ∥ canonical(input) ∥ canonical(output) ∥ timestamp_ns`;
/// `input` itself embeds the parent's hash so the chain is self-verifying
/// from stored input/output alone (spec §4.6, Testable Property 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionNode {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub node_type: String,
    pub source: String,
    pub timestamp_ns: i64,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub rationale: String,
    pub confidence: Option<f64>,
    pub hash: String,
    pub schema_version: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionChainSummary {
    pub chain_id: Uuid,
    pub profile_id: String,
    pub signal_id: String,
    pub outcome: ChainOutcome,
    pub sealed_at: Option<DateTime<Utc>>,
    pub duration_ns: Option<i64>,
}

// ---------------------------------------------------------------------------
// Sizing / execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub intent_id: String,
    pub chain_id: Uuid,
    pub profile_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub volume_micros: i64,
    pub stop_loss_micros: i64,
    pub take_profit_micros: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub broker_ticket: String,
    pub profile_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub volume_micros: i64,
    pub entry_price_micros: i64,
    pub stop_loss_micros: i64,
    pub take_profit_micros: i64,
    pub current_mark_micros: i64,
    pub unrealized_pnl_micros: i64,
    pub origin_signal_id: String,
    pub origin_chain_id: Uuid,
}

// ---------------------------------------------------------------------------
// Broker abstraction (spec §6 "Broker abstraction")
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub broker_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Direction,
    pub status: String,
    pub qty_micros: i64,
    pub limit_price_micros: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty_signed_micros: i64,
    pub avg_price_micros: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub equity_micros: i64,
    pub cash_micros: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub captured_at: DateTime<Utc>,
    pub account: BrokerAccount,
    pub orders: Vec<BrokerOrder>,
    pub positions: Vec<BrokerPosition>,
}

// ---------------------------------------------------------------------------
// Emergency control surface (spec §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStateKind {
    Normal,
    Hedged,
    Halted,
    Killed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyStateSnapshot {
    pub state: EmergencyStateKind,
    pub activator: Option<String>,
    pub reason: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
}
