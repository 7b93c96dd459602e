//! One profile's signal-to-execution worker. Per spec §5: "one logical
//! worker per profile handles SignalGate → RiskSizer → Executor in order for
//! that profile; multiple profiles run in parallel." Decision nodes for a
//! single chain are appended in causal order by this worker alone — no
//! interleaving with foreign chains.

use std::sync::Arc;
use std::time::Duration;

use gex_audit::DecisionChainWriter;
use gex_config::{GateConfig, RiskConfig};
use gex_emergency::EmergencyController;
use gex_gate::{submit as gate_submit, GateContext, GateOutcome};
use gex_portfolio::ProfileState;
use gex_reconcile::Side as ExecSide;
use gex_risk::{size as risk_size, RiskDecision, RiskRejectionReason, RiskSnapshot, SizingRequest};
use gex_schemas::{ChainOutcome, Direction, EmergencyStateKind, Signal};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::executor::{submit_with_retry, ExecutionOutcome, ExecutorSink};

/// Terminal result of processing one signal through the whole pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Executed { chain_id: Uuid },
    Rejected { chain_id: Option<Uuid>, reason: String },
    Blocked { chain_id: Option<Uuid>, reason: String },
    Duplicate { chain_id: Uuid },
    TimedOut { chain_id: Option<Uuid> },
    Cancelled { chain_id: Option<Uuid> },
}

impl SignalOutcome {
    pub fn chain_outcome(&self) -> Option<ChainOutcome> {
        match self {
            SignalOutcome::Executed { .. } => Some(ChainOutcome::Executed),
            SignalOutcome::Rejected { .. } | SignalOutcome::TimedOut { .. } => {
                Some(ChainOutcome::Rejected)
            }
            SignalOutcome::Blocked { .. } => Some(ChainOutcome::Blocked),
            SignalOutcome::Duplicate { .. } | SignalOutcome::Cancelled { .. } => None,
        }
    }
}

/// Global signal-to-execution budget (spec §5): breach seals the chain with
/// outcome `rejected` and node `pipeline.timeout`.
pub const SIGNAL_TO_EXECUTION_BUDGET: Duration = Duration::from_secs(30);

pub struct ProfileWorker<S: ExecutorSink> {
    pub profile_state: ProfileState,
    pub gate_config: GateConfig,
    pub risk_config: RiskConfig,
    pub sink: S,
    chain_log_path: std::path::PathBuf,
    emergency: Arc<Mutex<EmergencyController>>,
}

impl<S: ExecutorSink> ProfileWorker<S> {
    pub fn new(
        profile_state: ProfileState,
        gate_config: GateConfig,
        risk_config: RiskConfig,
        sink: S,
        chain_log_path: impl Into<std::path::PathBuf>,
        emergency: Arc<Mutex<EmergencyController>>,
    ) -> Self {
        Self {
            profile_state,
            gate_config,
            risk_config,
            sink,
            chain_log_path: chain_log_path.into(),
            emergency,
        }
    }

    /// Process one signal end to end, respecting `cancel` (checked at every
    /// stage boundary) and the global timeout budget.
    pub async fn process_signal(
        &mut self,
        signal: &Signal,
        emergency_state: EmergencyStateKind,
        risk_snapshot: &RiskSnapshot,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> SignalOutcome {
        let started = std::time::Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SignalOutcome::Cancelled { chain_id: None },
            outcome = self.process_signal_inner(signal, emergency_state, risk_snapshot, cancel, started) => outcome,
            _ = tokio::time::sleep(SIGNAL_TO_EXECUTION_BUDGET) => SignalOutcome::TimedOut { chain_id: None },
        }
    }

    async fn process_signal_inner(
        &mut self,
        signal: &Signal,
        emergency_state: EmergencyStateKind,
        risk_snapshot: &RiskSnapshot,
        cancel: &tokio_util::sync::CancellationToken,
        started: std::time::Instant,
    ) -> SignalOutcome {
        let now_ms = signal.submitted_at.timestamp_millis();

        let profile_health = gex_gate::ProfileHealth {
            exists: true,
            trading_enabled: self.profile_state.trading_enabled,
            connection_healthy: self.profile_state.connection_healthy,
        };

        let ctx = GateContext {
            signal,
            now_ms,
            emergency_state,
            profile: &profile_health,
            min_confidence: 0.0,
            rate_limit_per_minute: self.gate_config.signal_rate_limit_per_minute,
            rate_limit_exempt: matches!(
                signal.producer_tier,
                gex_schemas::ProducerTier::Critical
            ),
        };

        let gate_outcome = gate_submit(&ctx, &mut self.profile_state);

        let chain_id = match gate_outcome {
            GateOutcome::Admitted { chain_id } => chain_id,
            GateOutcome::Duplicate { chain_id, .. } => {
                return SignalOutcome::Duplicate { chain_id }
            }
            GateOutcome::Refused { refusal } => {
                return SignalOutcome::Blocked {
                    chain_id: None,
                    reason: refusal.to_string(),
                }
            }
        };

        let mut chain = match DecisionChainWriter::new(
            &self.chain_log_path,
            chain_id,
            &signal.profile_id,
            &signal.signal_id,
        ) {
            Ok(w) => w,
            Err(e) => {
                return SignalOutcome::Rejected {
                    chain_id: Some(chain_id),
                    reason: format!("failed to open decision chain log: {e}"),
                }
            }
        };

        let _ = chain.append(
            "signal.received",
            "SignalGate",
            json!({"signal_id": signal.signal_id, "profile_id": signal.profile_id}),
            json!({}),
            "signal admitted",
            Some(signal.confidence),
            now_ms * 1_000_000,
        );
        let _ = chain.append(
            "gate.passed",
            "SignalGate",
            json!({}),
            json!({"chain_id": chain_id}),
            "five gate checks passed",
            None,
            now_ms * 1_000_000 + 1,
        );

        if cancel.is_cancelled() {
            return SignalOutcome::Cancelled {
                chain_id: Some(chain_id),
            };
        }

        let sizing_req = SizingRequest {
            symbol: signal.symbol.clone(),
            confidence: signal.confidence,
            entry_price_micros: signal.entry_price_micros,
            stop_loss_micros: signal.stop_loss_micros,
            take_profit_micros: signal.take_profit_micros,
            is_buy: matches!(signal.direction, Direction::Buy),
        };

        let risk_decision = risk_size(&sizing_req, risk_snapshot, &self.risk_config);

        let (node_type, rationale) = match &risk_decision {
            RiskDecision::Approved { .. } => ("risk.approved", "full size approved"),
            RiskDecision::Reduced { .. } => ("risk.reduced", "size reduced by risk policy"),
            RiskDecision::Rejected { .. } => ("risk.rejected", "vetoed by risk policy"),
        };
        let _ = chain.append(
            node_type,
            "RiskSizer",
            json!({}),
            json!({"decision": format!("{risk_decision:?}")}),
            rationale,
            None,
            now_ms * 1_000_000 + 2,
        );

        let volume_micros = match risk_decision.volume_micros() {
            Some(v) => v,
            None => {
                if let RiskDecision::Rejected {
                    reason: RiskRejectionReason::DrawdownHalt,
                    ..
                } = &risk_decision
                {
                    let drawdown_fraction_micros =
                        (risk_snapshot.drawdown_fraction * 1_000_000.0).round() as i64;
                    let mut controller = self.emergency.lock().await;
                    if let Some(decision) =
                        controller.raise_halt_from_risk_veto(drawdown_fraction_micros)
                    {
                        drop(controller);
                        let _ = chain.append(
                            "emergency.halted",
                            "EmergencyController",
                            json!({}),
                            json!({
                                "from": format!("{:?}", decision.from),
                                "to": format!("{:?}", decision.to),
                            }),
                            "risk sizer drawdown veto raised emergency to halted",
                            None,
                            now_ms * 1_000_000 + 2,
                        );
                    }
                }
                return SignalOutcome::Rejected {
                    chain_id: Some(chain_id),
                    reason: "risk sizer vetoed".to_string(),
                };
            }
        };

        if cancel.is_cancelled() {
            return SignalOutcome::Cancelled {
                chain_id: Some(chain_id),
            };
        }

        let side = if matches!(signal.direction, Direction::Buy) {
            ExecSide::Buy
        } else {
            ExecSide::Sell
        };
        let client_order_id = format!("{}:{}", signal.profile_id, chain_id);

        let outcome = submit_with_retry(
            &self.sink,
            &client_order_id,
            &signal.symbol,
            side,
            volume_micros,
            |d| tokio::time::sleep(d),
        )
        .await;

        let duration_ns = started.elapsed().as_nanos() as i64;

        match outcome {
            ExecutionOutcome::Opened(snap) | ExecutionOutcome::Reconciled(snap) => {
                let _ = chain.append(
                    "position.opened",
                    "Executor",
                    json!({}),
                    json!({"broker_order_id": snap.order_id, "qty": snap.qty}),
                    "broker confirmed",
                    None,
                    now_ms * 1_000_000 + 3,
                );
                let _ = chain.summary(ChainOutcome::Executed, duration_ns);
                SignalOutcome::Executed { chain_id }
            }
            ExecutionOutcome::Rejected => {
                let _ = chain.append(
                    "execution.rejected",
                    "Executor",
                    json!({}),
                    json!({}),
                    "broker rejected order",
                    None,
                    now_ms * 1_000_000 + 3,
                );
                SignalOutcome::Rejected {
                    chain_id: Some(chain_id),
                    reason: "broker rejected".to_string(),
                }
            }
            ExecutionOutcome::MarketClosed => {
                let _ = chain.append(
                    "execution.market_closed",
                    "Executor",
                    json!({}),
                    json!({}),
                    "market closed",
                    None,
                    now_ms * 1_000_000 + 3,
                );
                SignalOutcome::Rejected {
                    chain_id: Some(chain_id),
                    reason: "market closed".to_string(),
                }
            }
            ExecutionOutcome::FailedTransient => {
                let _ = chain.append(
                    "execution.failed",
                    "Executor",
                    json!({}),
                    json!({}),
                    "retries exhausted",
                    None,
                    now_ms * 1_000_000 + 3,
                );
                SignalOutcome::Rejected {
                    chain_id: Some(chain_id),
                    reason: "transient failure, retries exhausted".to_string(),
                }
            }
        }
    }
}
