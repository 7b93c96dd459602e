//! PATCH 23: Minimum Viable Runtime Orchestrator (offline / deterministic).
//!
//! Composes existing engines into a single loop:
//!   bars → integrity → strategy → execution → paper broker → portfolio → risk → audit/artifacts
//!
//! Runs under one `run_id`, writes real artifacts (manifest.json + audit.jsonl).
//!
//! This orchestrator is intentionally minimal:
//! - No network I/O.
//! - Deterministic fill model (paper broker fills at bar close).
//! - Integrity disarm (PATCH 22) blocks execution end-to-end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::artifacts::{init_run_artifacts, InitRunArtifactsArgs};
use gex_audit::AuditWriter;
use gex_execution::{targets_to_order_intents, PositionBook, Side as ExecSide};
use gex_emergency::{
    evaluate_bar as integrity_evaluate_bar, tick_feed, Bar as IntegrityBar, BarKey, FeedId,
    IntegrityAction, IntegrityConfig, IntegrityState, Timeframe as IntegrityTimeframe,
};
use gex_portfolio::{
    apply_fill, compute_equity_micros, Fill, MarkMap, PortfolioState, Side as PfSide,
};
use gex_risk::{
    size as risk_size, OpenPositionView, RiskConfig, RiskDecision, RiskRejectionReason,
    RiskSnapshot, SizingRequest,
};
use crate::strategy::{BarStub, RecentBarsWindow, ShadowMode, Strategy, StrategyContext, StrategyHost};

use crate::paper_broker::PaperBroker;

/// Input bar for the orchestrator (mirrors BacktestBar but owned by testkit).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct OrchestratorBar {
    pub symbol: String,
    pub end_ts: i64,
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    pub volume: i64,
    pub is_complete: bool,
    pub day_id: u32,
}

/// Configuration for the orchestrator run.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Bar timeframe in seconds.
    pub timeframe_secs: i64,
    /// Initial cash in micros.
    pub initial_cash_micros: i64,
    /// Maximum recent bars for strategy context.
    pub bar_history_len: usize,
    /// Enable integrity checking.
    pub integrity_enabled: bool,
    /// Stale threshold in ticks.
    pub integrity_stale_threshold_ticks: u64,
    /// Gap tolerance bars.
    pub integrity_gap_tolerance_bars: u32,
    /// Enforce feed disagreement.
    pub integrity_enforce_feed_disagreement: bool,
    /// Enable hash chain on audit log.
    pub audit_hash_chain: bool,
    /// Stop distance fed to RiskSizer, as a fraction of entry price. The
    /// offline harness has no producer-supplied stop/take-profit — only a
    /// strategy's target quantity — so a sizing request is synthesized
    /// around each bar's close.
    pub synthetic_stop_distance_fraction: f64,
    /// Take-profit distance fed to RiskSizer, as a fraction of entry price.
    pub synthetic_take_profit_fraction: f64,
    /// Confidence fed to RiskSizer for every synthesized sizing request.
    pub synthetic_confidence: f64,
}

impl OrchestratorConfig {
    pub fn test_defaults() -> Self {
        Self {
            timeframe_secs: 60,
            initial_cash_micros: 100_000_000_000, // 100k
            bar_history_len: 50,
            integrity_enabled: false,
            integrity_stale_threshold_ticks: 0,
            integrity_gap_tolerance_bars: 0,
            integrity_enforce_feed_disagreement: false,
            audit_hash_chain: true,
            synthetic_stop_distance_fraction: 0.01,
            synthetic_take_profit_fraction: 0.02,
            synthetic_confidence: 0.75,
        }
    }
}

/// Report produced after an orchestrator run.
#[derive(Clone, Debug)]
pub struct OrchestratorReport {
    pub run_id: Uuid,
    pub bars_processed: usize,
    pub fills_count: usize,
    pub broker_acks: usize,
    pub broker_fills: usize,
    pub audit_events: usize,
    pub execution_blocked: bool,
    pub halted: bool,
    pub run_dir: PathBuf,
    pub equity_curve: Vec<(i64, i64)>,
}

/// The orchestrator: composes all crate engines into one offline loop.
pub struct Orchestrator {
    config: OrchestratorConfig,
    run_id: Uuid,
    host: StrategyHost,
    portfolio: PortfolioState,
    risk_config: RiskConfig,
    /// Highest equity observed so far; RiskSizer's drawdown step is measured
    /// from this watermark (mirrors `gex_portfolio::ProfileState`).
    peak_equity_micros: i64,
    integrity_config: IntegrityConfig,
    integrity_state: IntegrityState,
    broker: PaperBroker,
    last_prices: MarkMap,
    fills: Vec<Fill>,
    equity_curve: Vec<(i64, i64)>,
    recent_bars: Vec<BarStub>,
    bar_count: u64,
    halted: bool,
    execution_blocked: bool,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let host = StrategyHost::new(ShadowMode::Off);
        let portfolio = PortfolioState::new(config.initial_cash_micros);
        let risk_config = RiskConfig::default();
        let peak_equity_micros = config.initial_cash_micros;
        let integrity_config = IntegrityConfig {
            gap_tolerance_bars: config.integrity_gap_tolerance_bars,
            stale_threshold_ticks: config.integrity_stale_threshold_ticks,
            enforce_feed_disagreement: config.integrity_enforce_feed_disagreement,
            calendar: gex_emergency::CalendarSpec::AlwaysOn,
        };

        Self {
            config,
            run_id: Uuid::new_v4(),
            host,
            portfolio,
            risk_config,
            peak_equity_micros,
            integrity_config,
            integrity_state: IntegrityState::new(),
            broker: PaperBroker::new(),
            last_prices: BTreeMap::new(),
            fills: Vec::new(),
            equity_curve: Vec::new(),
            recent_bars: Vec::new(),
            bar_count: 0,
            halted: false,
            execution_blocked: false,
        }
    }

    /// Register a strategy (must be called before run).
    pub fn add_strategy(&mut self, s: Box<dyn Strategy>) -> Result<()> {
        self.host
            .register(s)
            .map_err(|e| anyhow::anyhow!("strategy registration failed: {:?}", e))
    }

    /// Seed an integrity feed (for multi-feed stale detection).
    pub fn seed_integrity_feed(&mut self, feed_name: &str, tick: u64) {
        let feed = FeedId::new(feed_name);
        tick_feed(
            &self.integrity_config,
            &mut self.integrity_state,
            &feed,
            tick,
        );
    }

    /// Returns the run_id (for inspecting artifacts after run).
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether execution is currently blocked by integrity.
    pub fn is_execution_blocked(&self) -> bool {
        self.execution_blocked
    }

    /// Reference to the integrity state.
    pub fn integrity_state(&self) -> &IntegrityState {
        &self.integrity_state
    }

    /// Reference to the paper broker.
    pub fn broker(&self) -> &PaperBroker {
        &self.broker
    }

    /// Run the full orchestrator loop over the given bars, writing artifacts.
    pub fn run(
        &mut self,
        bars: &[OrchestratorBar],
        exports_root: &Path,
    ) -> Result<OrchestratorReport> {
        // 1. Initialize artifacts (manifest.json + placeholder files).
        let config_hash = format!("{:016x}", 0u64); // deterministic placeholder
        let artifacts = init_run_artifacts(InitRunArtifactsArgs {
            exports_root,
            schema_version: 1,
            run_id: self.run_id,
            engine_id: "ORCH_MVP",
            mode: "PAPER",
            git_hash: "000000",
            config_hash: &config_hash,
            host_fingerprint: "test|orchestrator|mvp",
        })
        .context("init_run_artifacts failed")?;

        // 2. Create audit writer in the run directory.
        let audit_path = artifacts.run_dir.join("audit.jsonl");
        let mut audit = AuditWriter::new(&audit_path, self.config.audit_hash_chain)
            .context("create audit writer failed")?;
        let mut audit_event_count = 0usize;

        // Write run_start event.
        audit.append(
            self.run_id,
            "lifecycle",
            "run_start",
            serde_json::json!({
                "engine_id": "ORCH_MVP",
                "mode": "PAPER",
                "bar_count": bars.len(),
            }),
        )?;
        audit_event_count += 1;

        // 3. Main loop: bars → integrity → strategy → execution → broker → portfolio → risk.
        let mut bars_processed = 0usize;

        for bar in bars {
            if self.halted {
                break;
            }

            // --- Integrity gate ---
            if self.config.integrity_enabled {
                let feed = FeedId::new("orchestrator");
                let now_tick = bar.end_ts as u64;
                let int_bar = IntegrityBar::new(
                    BarKey::new(
                        bar.symbol.clone(),
                        IntegrityTimeframe::secs(self.config.timeframe_secs),
                        bar.end_ts,
                    ),
                    bar.is_complete,
                    bar.close_micros,
                    bar.volume,
                );
                let decision = integrity_evaluate_bar(
                    &self.integrity_config,
                    &mut self.integrity_state,
                    &feed,
                    now_tick,
                    &int_bar,
                );
                match decision.action {
                    IntegrityAction::Disarm | IntegrityAction::Halt | IntegrityAction::Reject => {
                        if !self.execution_blocked {
                            // Log the disarm event.
                            audit.append(
                                self.run_id,
                                "integrity",
                                "execution_blocked",
                                serde_json::json!({
                                    "action": format!("{:?}", decision.action),
                                    "reason": format!("{:?}", decision.reason),
                                    "bar_end_ts": bar.end_ts,
                                }),
                            )?;
                            audit_event_count += 1;
                        }
                        self.execution_blocked = true;
                    }
                    IntegrityAction::Allow => {}
                }
            }

            // --- Update marks ---
            self.last_prices
                .insert(bar.symbol.clone(), bar.close_micros);

            // --- Track peak equity for drawdown ---
            {
                let equity = compute_equity_micros(
                    self.portfolio.cash_micros,
                    &self.portfolio.positions,
                    &self.last_prices,
                );
                if equity > self.peak_equity_micros {
                    self.peak_equity_micros = equity;
                }
            }

            // --- Strategy ---
            self.bar_count += 1;
            let stub = BarStub::new(bar.end_ts, bar.is_complete, bar.close_micros, bar.volume);
            self.recent_bars.push(stub);
            if self.recent_bars.len() > self.config.bar_history_len {
                let start = self.recent_bars.len() - self.config.bar_history_len;
                self.recent_bars = self.recent_bars.split_off(start);
            }

            let recent =
                RecentBarsWindow::new(self.config.bar_history_len, self.recent_bars.clone());
            let ctx = StrategyContext::new(self.config.timeframe_secs, self.bar_count, recent);

            let bar_result = self
                .host
                .on_bar(&ctx)
                .map_err(|e| anyhow::anyhow!("strategy on_bar failed: {:?}", e))?;

            // --- Shadow mode check ---
            if !bar_result.intents.should_execute() {
                let equity = compute_equity_micros(
                    self.portfolio.cash_micros,
                    &self.portfolio.positions,
                    &self.last_prices,
                );
                self.equity_curve.push((bar.end_ts, equity));
                bars_processed += 1;
                continue;
            }

            // --- Integrity disarm gate ---
            if self.execution_blocked {
                let equity = compute_equity_micros(
                    self.portfolio.cash_micros,
                    &self.portfolio.positions,
                    &self.last_prices,
                );
                self.equity_curve.push((bar.end_ts, equity));
                bars_processed += 1;
                continue;
            }

            // --- Execution: convert targets to order intents ---
            let position_book = self.build_position_book();
            let exec_decision =
                targets_to_order_intents(&position_book, &bar_result.intents.output);

            // --- Process each intent through risk → broker → portfolio ---
            for intent in &exec_decision.intents {
                if self.halted {
                    break;
                }

                let equity = compute_equity_micros(
                    self.portfolio.cash_micros,
                    &self.portfolio.positions,
                    &self.last_prices,
                );

                let risk_snapshot = self.build_risk_snapshot(equity);
                let sizing_req = self.build_sizing_request(intent, bar.close_micros);
                let risk_decision = risk_size(&sizing_req, &risk_snapshot, &self.risk_config);

                let volume_micros = match &risk_decision {
                    RiskDecision::Approved { volume_micros, .. }
                    | RiskDecision::Reduced { volume_micros, .. } => *volume_micros,
                    RiskDecision::Rejected { reason, .. } => {
                        if matches!(reason, RiskRejectionReason::DrawdownHalt) {
                            self.halted = true;
                        }
                        continue;
                    }
                };

                let side_str = match intent.side {
                    ExecSide::Buy => "BUY",
                    ExecSide::Sell => "SELL",
                };

                // Paper broker: fill at bar close.
                let (ack, broker_fill) = self.broker.submit_order(
                    &intent.symbol,
                    side_str,
                    volume_micros,
                    bar.close_micros,
                );

                // Audit the ack + fill.
                audit.append(
                    self.run_id,
                    "broker",
                    "order_ack",
                    serde_json::to_value(&ack)?,
                )?;
                audit_event_count += 1;

                audit.append(
                    self.run_id,
                    "broker",
                    "fill",
                    serde_json::to_value(&broker_fill)?,
                )?;
                audit_event_count += 1;

                // Apply fill to portfolio.
                let pf_side = match intent.side {
                    ExecSide::Buy => PfSide::Buy,
                    ExecSide::Sell => PfSide::Sell,
                };
                let fill = Fill::new(
                    intent.symbol.clone(),
                    pf_side,
                    volume_micros,
                    bar.close_micros,
                    0,
                );
                apply_fill(&mut self.portfolio, &fill);
                self.fills.push(fill);
            }

            // --- Equity curve point ---
            let equity = compute_equity_micros(
                self.portfolio.cash_micros,
                &self.portfolio.positions,
                &self.last_prices,
            );
            self.equity_curve.push((bar.end_ts, equity));
            bars_processed += 1;
        }

        // 4. Write run_end event.
        audit.append(
            self.run_id,
            "lifecycle",
            "run_end",
            serde_json::json!({
                "bars_processed": bars_processed,
                "fills": self.fills.len(),
                "halted": self.halted,
                "execution_blocked": self.execution_blocked,
            }),
        )?;
        audit_event_count += 1;

        Ok(OrchestratorReport {
            run_id: self.run_id,
            bars_processed,
            fills_count: self.fills.len(),
            broker_acks: self.broker.ack_count(),
            broker_fills: self.broker.fill_count(),
            audit_events: audit_event_count,
            execution_blocked: self.execution_blocked,
            halted: self.halted,
            run_dir: artifacts.run_dir,
            equity_curve: self.equity_curve.clone(),
        })
    }

    fn build_position_book(&self) -> PositionBook {
        let mut book = PositionBook::new();
        for (sym, pos) in &self.portfolio.positions {
            let qty = pos.qty_signed();
            if qty != 0 {
                book.insert(sym.clone(), qty);
            }
        }
        book
    }

    /// Snapshot of profile state RiskSizer needs, lifted from the portfolio
    /// ledger and the peak-equity watermark (mirrors
    /// `gex_portfolio::ProfileState::drawdown_fraction`). No correlation
    /// tracking exists in this offline harness, so correlation veto never
    /// fires here.
    fn build_risk_snapshot(&self, equity_micros: i64) -> RiskSnapshot {
        let drawdown_fraction = if self.peak_equity_micros > 0 {
            ((self.peak_equity_micros - equity_micros) as f64 / self.peak_equity_micros as f64)
                .max(0.0)
        } else {
            0.0
        };

        let open_positions = self
            .portfolio
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| {
                let mark = *self.last_prices.get(&p.symbol).unwrap_or(&0);
                let notional_micros = (p.qty_signed().unsigned_abs() as i128 * mark as i128)
                    .clamp(i64::MIN as i128, i64::MAX as i128) as i64;
                OpenPositionView {
                    symbol: p.symbol.clone(),
                    notional_micros,
                    volatility: 0.0,
                }
            })
            .collect();

        RiskSnapshot {
            equity_micros,
            drawdown_fraction,
            open_positions,
            correlations: BTreeMap::new(),
        }
    }

    /// Synthesize a sizing request around the strategy's target quantity and
    /// the bar's close price, since bars carry no producer-supplied
    /// confidence/stop/take-profit of their own.
    fn build_sizing_request(
        &self,
        intent: &gex_execution::OrderIntent,
        entry_price_micros: i64,
    ) -> SizingRequest {
        let is_buy = matches!(intent.side, ExecSide::Buy);
        let stop_distance =
            (entry_price_micros as f64 * self.config.synthetic_stop_distance_fraction) as i64;
        let take_profit_distance =
            (entry_price_micros as f64 * self.config.synthetic_take_profit_fraction) as i64;

        let (stop_loss_micros, take_profit_micros) = if is_buy {
            (
                entry_price_micros - stop_distance,
                entry_price_micros + take_profit_distance,
            )
        } else {
            (
                entry_price_micros + stop_distance,
                entry_price_micros - take_profit_distance,
            )
        };

        SizingRequest {
            symbol: intent.symbol.clone(),
            confidence: self.config.synthetic_confidence,
            entry_price_micros,
            stop_loss_micros,
            take_profit_micros,
            is_buy,
        }
    }
}
