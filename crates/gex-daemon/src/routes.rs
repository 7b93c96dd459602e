//! Axum router and all HTTP handlers for gex-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use gex_risk::{OpenPositionView, RiskSnapshot};
use gex_schemas::{Direction, ProducerTier, Signal};

use crate::{
    api_types::{
        GateRefusedResponse, HealthResponse, IntegrityResponse, SignalSubmitRequest,
        SignalSubmitResponse, TradingAccountResponse, TradingFillsResponse, TradingOrdersResponse,
        TradingPositionsResponse, TradingSnapshotResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/signal", post(signal_submit))
        .route("/v1/run/start", post(run_start))
        .route("/v1/run/stop", post(run_stop))
        .route("/v1/run/halt", post(run_halt))
        .route("/v1/integrity/arm", post(integrity_arm))
        .route("/v1/integrity/disarm", post(integrity_disarm))
        // DAEMON-1: trading read APIs (placeholder until broker wiring exists)
        .route("/v1/trading/account", get(trading_account))
        .route("/v1/trading/positions", get(trading_positions))
        .route("/v1/trading/orders", get(trading_orders))
        .route("/v1/trading/fills", get(trading_fills))
        // DAEMON-2: dev-only snapshot inject/clear + readback
        .route("/v1/trading/snapshot", get(trading_snapshot))
        .route("/v1/trading/snapshot", post(trading_snapshot_set))
        .route(
            "/v1/trading/snapshot",
            axum::routing::delete(trading_snapshot_clear),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /v1/signal — producer ingress
// ---------------------------------------------------------------------------

/// Parse a dollar amount into micros, rounding to the nearest unit.
fn micros(dollars: f64) -> i64 {
    (dollars * gex_risk::MICROS_SCALE as f64).round() as i64
}

/// Accept a producer signal and drive it through SignalGate -> RiskSizer ->
/// Executor (`Pipeline::submit`). The profile is auto-registered with the
/// pipeline on first sight via `AppState::ensure_profile`.
pub(crate) async fn signal_submit(
    State(st): State<Arc<AppState>>,
    Json(req): Json<SignalSubmitRequest>,
) -> Response {
    let direction = match req.direction.to_ascii_uppercase().as_str() {
        "BUY" => Direction::Buy,
        "SELL" => Direction::Sell,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(SignalSubmitResponse {
                    accepted: false,
                    chain_id: None,
                    reason: Some(format!("unknown direction: {other}")),
                }),
            )
                .into_response();
        }
    };

    let signal = Signal {
        signal_id: req.signal_id,
        profile_id: req.profile_id.clone(),
        symbol: req.symbol.clone(),
        direction,
        confidence: req.confidence,
        entry_price_micros: micros(req.entry_price),
        stop_loss_micros: micros(req.stop_loss),
        take_profit_micros: micros(req.take_profit),
        source: req.source,
        producer_tier: ProducerTier::default(),
        submitted_at: req.submitted_at,
    };

    let profile = st.ensure_profile(&req.profile_id).await;

    // Volatility has no live source yet (no price-history feed wired into
    // gex-daemon); RiskSizer's CVaR step degrades to treating every open
    // position as zero-variance until one is added.
    let open_positions = profile
        .portfolio
        .positions
        .values()
        .filter(|p| !p.is_flat())
        .map(|p| {
            let mark = *profile.marks.get(&p.symbol).unwrap_or(&0);
            let notional_micros = (p.qty_signed().unsigned_abs() as i128 * mark as i128)
                .clamp(i64::MIN as i128, i64::MAX as i128) as i64;
            OpenPositionView {
                symbol: p.symbol.clone(),
                notional_micros,
                volatility: 0.0,
            }
        })
        .collect();

    let risk_snapshot = RiskSnapshot {
        equity_micros: profile.equity_micros(),
        drawdown_fraction: profile.drawdown_fraction(),
        open_positions,
        correlations: profile.correlations.clone(),
    };

    let emergency_state = st.pipeline.emergency_state().await;

    let outcome = st.pipeline.submit(signal, emergency_state, risk_snapshot).await;

    let response = match outcome {
        Ok(outcome) => match outcome {
            gex_pipeline::SignalOutcome::Executed { chain_id } => SignalSubmitResponse {
                accepted: true,
                chain_id: Some(chain_id),
                reason: None,
            },
            gex_pipeline::SignalOutcome::Duplicate { chain_id } => SignalSubmitResponse {
                accepted: true,
                chain_id: Some(chain_id),
                reason: Some("duplicate signal_id; original decision returned".to_string()),
            },
            gex_pipeline::SignalOutcome::Rejected { chain_id, reason } => SignalSubmitResponse {
                accepted: false,
                chain_id,
                reason: Some(reason),
            },
            gex_pipeline::SignalOutcome::Blocked { chain_id, reason } => SignalSubmitResponse {
                accepted: false,
                chain_id,
                reason: Some(reason),
            },
            gex_pipeline::SignalOutcome::TimedOut { chain_id } => SignalSubmitResponse {
                accepted: false,
                chain_id,
                reason: Some("signal-to-execution budget exceeded".to_string()),
            },
            gex_pipeline::SignalOutcome::Cancelled { chain_id } => SignalSubmitResponse {
                accepted: false,
                chain_id,
                reason: Some("pipeline shutting down".to_string()),
            },
        },
        Err(err) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(SignalSubmitResponse {
                    accepted: false,
                    chain_id: None,
                    reason: Some(err.to_string()),
                }),
            )
                .into_response();
        }
    };

    (StatusCode::OK, Json(response)).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = uptime_secs();

    // Patch C2: sync integrity_armed from the authoritative gate — reflects
    // both `disarmed` and `halted` flags via `is_execution_blocked()`.
    {
        let ig = st.integrity.read().await;
        snap.integrity_armed = !ig.is_execution_blocked();
    }

    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/run/start
// ---------------------------------------------------------------------------

/// Start a live run.
///
/// # Gate (Patch L1)
/// Returns `403 Forbidden` if the integrity engine is disarmed or halted.
/// Execution cannot be started when system integrity is not armed.
/// This mirrors the `BrokerGateway` gate check at the control-plane level.
pub(crate) async fn run_start(State(st): State<Arc<AppState>>) -> Response {
    // Gate: integrity must be armed before any run can start.
    {
        let ig = st.integrity.read().await;
        if ig.is_execution_blocked() {
            return (
                StatusCode::FORBIDDEN,
                Json(GateRefusedResponse {
                    error: "GATE_REFUSED: integrity disarmed or halted; arm integrity first"
                        .to_string(),
                    gate: "integrity_armed".to_string(),
                }),
            )
                .into_response();
        }
    }

    let mut s = st.status.write().await;

    if s.state != "running" {
        s.active_run_id = Some(derive_daemon_run_id(st.build.service, st.build.version));
    }
    s.state = "running".to_string();
    s.notes = Some("run started (in-memory); wire orchestrator next".to_string());
    s.daemon_uptime_secs = uptime_secs();

    // Patch C2: sync integrity_armed from the authoritative gate.
    {
        let ig = st.integrity.read().await;
        s.integrity_armed = !ig.is_execution_blocked();
    }

    let snap = s.clone();
    drop(s);

    info!(run_id = ?snap.active_run_id, "run/start");
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/run/stop
// ---------------------------------------------------------------------------

pub(crate) async fn run_stop(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut s = st.status.write().await;

    s.active_run_id = None;
    s.state = "idle".to_string();
    s.notes = Some("run stopped (in-memory)".to_string());
    s.daemon_uptime_secs = uptime_secs();

    // Patch C2: sync integrity_armed from the authoritative gate.
    {
        let ig = st.integrity.read().await;
        s.integrity_armed = !ig.is_execution_blocked();
    }

    let snap = s.clone();
    drop(s);

    info!("run/stop");
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/run/halt
// ---------------------------------------------------------------------------

pub(crate) async fn run_halt(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    // Patch C2: set integrity halted — makes halt sticky across the session.
    // Execution gate (`is_execution_blocked`) will return true until the
    // operator explicitly calls `POST /v1/integrity/arm`.
    {
        let mut ig = st.integrity.write().await;
        ig.halted = true;
    }

    let mut s = st.status.write().await;

    // Keep run_id so the GUI can show what was halted.
    s.state = "halted".to_string();
    s.notes = Some("HALT asserted (in-memory); execution should gate on this later".to_string());
    s.daemon_uptime_secs = uptime_secs();

    // Patch C2: sync integrity_armed from the authoritative gate.
    {
        let ig = st.integrity.read().await;
        s.integrity_armed = !ig.is_execution_blocked();
    }

    let snap = s.clone();
    drop(s);

    info!("run/halt");
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/integrity/arm
// ---------------------------------------------------------------------------

pub(crate) async fn integrity_arm(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    // Patch C2: arm clears BOTH disarmed and halted — it is the sole escape
    // from any blocked integrity state (mirrors ArmState::arm() semantics).
    {
        let mut ig = st.integrity.write().await;
        ig.disarmed = false;
        ig.halted = false;
    }

    // Sync the status snapshot. Both flags are now false so is_armed = true.
    let (armed, active_run_id, state) = {
        let mut s = st.status.write().await;
        s.integrity_armed = true;
        (true, s.active_run_id, s.state.clone())
    };

    info!("integrity/arm");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "integrity armed".to_string(),
    });

    (
        StatusCode::OK,
        Json(IntegrityResponse {
            armed,
            active_run_id,
            state,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/integrity/disarm
// ---------------------------------------------------------------------------

pub(crate) async fn integrity_disarm(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    // disarm = set the disarmed flag
    {
        let mut ig = st.integrity.write().await;
        ig.disarmed = true;
    }

    // Sync the status snapshot.
    let (armed, active_run_id, state) = {
        let mut s = st.status.write().await;
        s.integrity_armed = false;
        (false, s.active_run_id, s.state.clone())
    };

    info!("integrity/disarm");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: "integrity DISARMED".to_string(),
    });

    (
        StatusCode::OK,
        Json(IntegrityResponse {
            armed,
            active_run_id,
            state,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/trading/*  — DAEMON-1 (read-only placeholders)
// ---------------------------------------------------------------------------

pub(crate) async fn trading_account(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.broker_snapshot.read().await.clone();

    let (has_snapshot, account) = match snap {
        Some(s) => (true, s.account),
        None => (
            false,
            gex_schemas::BrokerAccount {
                equity_micros: 0,
                cash_micros: 0,
                currency: "USD".to_string(),
            },
        ),
    };

    (
        StatusCode::OK,
        Json(TradingAccountResponse {
            has_snapshot,
            account,
        }),
    )
}

pub(crate) async fn trading_positions(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.broker_snapshot.read().await.clone();
    let (has_snapshot, positions) = match snap {
        Some(s) => (true, s.positions),
        None => (false, Vec::new()),
    };

    (
        StatusCode::OK,
        Json(TradingPositionsResponse {
            has_snapshot,
            positions,
        }),
    )
}

pub(crate) async fn trading_orders(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.broker_snapshot.read().await.clone();
    let (has_snapshot, orders) = match snap {
        Some(s) => (true, s.orders),
        None => (false, Vec::new()),
    };

    (
        StatusCode::OK,
        Json(TradingOrdersResponse {
            has_snapshot,
            orders,
        }),
    )
}

pub(crate) async fn trading_fills(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let has_snapshot = st.broker_snapshot.read().await.is_some();

    (
        StatusCode::OK,
        Json(TradingFillsResponse {
            has_snapshot,
            fills: Vec::new(),
        }),
    )
}

pub(crate) async fn trading_snapshot(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.broker_snapshot.read().await.clone();
    (
        StatusCode::OK,
        Json(TradingSnapshotResponse { snapshot: snap }),
    )
}

// ---------------------------------------------------------------------------
// DAEMON-2: Dev-only snapshot inject/clear
// ---------------------------------------------------------------------------

#[derive(serde::Serialize)]
struct OkResponse {
    ok: bool,
}

pub(crate) async fn trading_snapshot_set(
    State(st): State<Arc<AppState>>,
    Json(body): Json<gex_schemas::BrokerSnapshot>,
) -> Response {
    let allow = std::env::var("MQK_DEV_ALLOW_SNAPSHOT_INJECT")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !allow {
        return (
            StatusCode::FORBIDDEN,
            Json(GateRefusedResponse {
                error:
                    "GATE_REFUSED: snapshot injection disabled; set MQK_DEV_ALLOW_SNAPSHOT_INJECT=1"
                        .to_string(),
                gate: "dev_snapshot_inject".to_string(),
            }),
        )
            .into_response();
    }

    {
        let mut lock = st.broker_snapshot.write().await;
        *lock = Some(body);
    }

    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "broker snapshot injected (dev)".to_string(),
    });

    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

pub(crate) async fn trading_snapshot_clear(State(st): State<Arc<AppState>>) -> Response {
    let allow = std::env::var("MQK_DEV_ALLOW_SNAPSHOT_INJECT")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !allow {
        return (
            StatusCode::FORBIDDEN,
            Json(GateRefusedResponse {
                error: "GATE_REFUSED: snapshot clear disabled; set MQK_DEV_ALLOW_SNAPSHOT_INJECT=1"
                    .to_string(),
                gate: "dev_snapshot_inject".to_string(),
            }),
        )
            .into_response();
    }

    {
        let mut lock = st.broker_snapshot.write().await;
        *lock = None;
    }

    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "broker snapshot cleared (dev)".to_string(),
    });

    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

// ---------------------------------------------------------------------------
// Run-ID derivation (D1-1)
// ---------------------------------------------------------------------------

/// Derive a deterministic in-memory run ID from daemon build metadata.
///
/// **No RNG.** Uses `Uuid::new_v5` (SHA-1 over the DNS namespace).
///
/// Inputs: `service` (crate name, static str) and `version` (semver, static
/// str). Both are compile-time constants — no wall-clock, no random state.
///
/// The resulting UUID is stable for a given binary version, making it
/// suitable as an in-memory session label. The authoritative run ID for DB
/// persistence and cross-system audit correlation is created by `gex-cli`
/// (see `derive_cli_run_id` in `gex-cli/src/commands/run.rs`). A later
/// patch will wire the CLI run ID into the daemon so both IDs unify.
fn derive_daemon_run_id(service: &'static str, version: &'static str) -> Uuid {
    let data = format!("gex-daemon.run.v1|{}|{}", service, version);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Status(_) => "status",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
