//! Shared runtime state for gex-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gex_emergency::IntegrityState;
use gex_pipeline::{PaperExecutorSink, Pipeline};
use gex_portfolio::ProfileState;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Starting cash and per-profile position cap for a profile auto-registered
/// on its first signal. A later patch will source these from the profile's
/// own config rather than a flat default.
const DEFAULT_PROFILE_INITIAL_CASH_MICROS: i64 = 1_000_000 * 1_000_000;
const DEFAULT_PROFILE_MAX_POSITIONS: u32 = 10;

// ---------------------------------------------------------------------------
// BusMsg â€” SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of daemon state, returned by GET /v1/status and
/// carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub active_run_id: Option<Uuid>,
    /// "idle" | "running" | "halted"
    pub state: String,
    pub notes: Option<String>,
    /// Reflects `IntegrityState::is_execution_blocked()` negation: true = armed.
    pub integrity_armed: bool,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// Mutable run/status state.
    pub status: Arc<RwLock<StatusSnapshot>>,
    /// Integrity engine state (arm / disarm).
    pub integrity: Arc<RwLock<IntegrityState>>,
    /// Last injected/fetched broker snapshot (DAEMON-1/2: dev-only inject
    /// until a live reconcile loop populates this).
    pub broker_snapshot: Arc<RwLock<Option<gex_schemas::BrokerSnapshot>>>,
    /// SignalGate -> RiskSizer -> Executor pipeline (spec Â§4.7/Â§5), the
    /// single in-process path a producer-submitted signal takes to become
    /// an order. Paper-mode sink only; live wiring is BrokerPool work not
    /// yet undertaken (same status as `gex-broker-live`).
    pub pipeline: Arc<Pipeline<PaperExecutorSink>>,
    /// Mirrors what's registered with `pipeline`, kept here so a handler can
    /// read equity/drawdown/positions to build a `RiskSnapshot` for the next
    /// submission (`Pipeline` itself only exposes a `submit`/`register`
    /// surface, not a read-back of the state it moved into each worker).
    pub signal_profiles: Arc<RwLock<BTreeMap<String, ProfileState>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            active_run_id: None,
            state: "idle".to_string(),
            notes: Some("placeholder status; wire run loop next".to_string()),
            integrity_armed: true, // armed = not disarmed
        };

        Self {
            bus,
            build: BuildInfo {
                service: "gex-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(initial_status)),
            integrity: Arc::new(RwLock::new(IntegrityState::new())),
            broker_snapshot: Arc::new(RwLock::new(None)),
            pipeline: Arc::new(Pipeline::new(
                gex_config::GateConfig::default(),
                gex_config::RiskConfig::default(),
                chain_log_dir_from_env(),
                PaperExecutorSink::new,
            )),
            signal_profiles: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Look up this profile's bookkeeping, registering a fresh one (and with
    /// `pipeline`) on first sight.
    pub async fn ensure_profile(&self, profile_id: &str) -> ProfileState {
        {
            let profiles = self.signal_profiles.read().await;
            if let Some(p) = profiles.get(profile_id) {
                return p.clone();
            }
        }

        let fresh = ProfileState::new(
            profile_id,
            DEFAULT_PROFILE_INITIAL_CASH_MICROS,
            DEFAULT_PROFILE_MAX_POSITIONS,
        );
        self.pipeline.register_profile(fresh.clone()).await;
        self.signal_profiles
            .write()
            .await
            .insert(profile_id.to_string(), fresh.clone());
        fresh
    }
}

/// Directory decision-chain logs are written under; overridable so an
/// operator can point it at a persistent volume.
fn chain_log_dir_from_env() -> std::path::PathBuf {
    std::env::var("MQK_CHAIN_LOG_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("./var/chain_log"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
