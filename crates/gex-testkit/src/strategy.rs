//! Minimal strategy-fixture harness for `Orchestrator`.
//!
//! The gateway's core does not generate trading ideas (spec §1 Non-goals);
//! `gex-testkit` still needs *something* to turn bars into `TargetPosition`s
//! so end-to-end scenario tests can drive the real pipeline. This module is
//! that fixture seam — deliberately small, analogous to the teacher's
//! `mqk-strategy::StrategyHost`/`ShadowMode` shape but scoped to test-only
//! signal generation rather than a production strategy engine.

use anyhow::Result;
use gex_execution::StrategyOutput;

/// One bar's worth of the fields a fixture strategy might inspect.
#[derive(Clone, Debug)]
pub struct BarStub {
    pub end_ts: i64,
    pub is_complete: bool,
    pub close_micros: i64,
    pub volume: i64,
}

impl BarStub {
    pub fn new(end_ts: i64, is_complete: bool, close_micros: i64, volume: i64) -> Self {
        Self {
            end_ts,
            is_complete,
            close_micros,
            volume,
        }
    }
}

/// A bounded trailing window of recent bars, newest last.
#[derive(Clone, Debug)]
pub struct RecentBarsWindow {
    max_len: usize,
    bars: Vec<BarStub>,
}

impl RecentBarsWindow {
    pub fn new(max_len: usize, bars: Vec<BarStub>) -> Self {
        Self { max_len, bars }
    }

    pub fn bars(&self) -> &[BarStub] {
        &self.bars
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

/// Identifies a registered strategy and its native bar timeframe.
#[derive(Clone, Debug)]
pub struct StrategySpec {
    pub name: String,
    pub timeframe_secs: i64,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>, timeframe_secs: i64) -> Self {
        Self {
            name: name.into(),
            timeframe_secs,
        }
    }
}

/// What a strategy sees on each bar close.
#[derive(Clone, Debug)]
pub struct StrategyContext {
    pub timeframe_secs: i64,
    pub bar_count: u64,
    pub recent: RecentBarsWindow,
}

impl StrategyContext {
    pub fn new(timeframe_secs: i64, bar_count: u64, recent: RecentBarsWindow) -> Self {
        Self {
            timeframe_secs,
            bar_count,
            recent,
        }
    }
}

/// A test-fixture trading idea generator. Production signal generation lives
/// entirely outside the core (spec §1); this trait exists only so
/// `Orchestrator` can be driven by a deterministic, test-authored source of
/// `TargetPosition`s.
pub trait Strategy: Send {
    fn spec(&self) -> StrategySpec;
    fn on_bar(&mut self, ctx: &StrategyContext) -> StrategyOutput;
}

/// Whether the host's registered strategies are allowed to actually reach
/// the execution path, or are only observed (shadow).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowMode {
    /// Targets flow through to execution.
    Off,
    /// Targets are computed but `should_execute()` reports false.
    On,
}

/// Bundles a bar's strategy-derived targets with whether they should reach
/// execution, mirroring the teacher's shadow/live host split.
#[derive(Clone, Debug)]
pub struct HostIntents {
    pub output: StrategyOutput,
    mode: ShadowMode,
}

impl HostIntents {
    pub fn should_execute(&self) -> bool {
        self.mode == ShadowMode::Off
    }
}

#[derive(Clone, Debug)]
pub struct HostBarResult {
    pub intents: HostIntents,
}

#[derive(Debug)]
pub struct StrategyHostError(pub String);

/// Composes zero-or-more registered strategies behind one shadow-mode gate.
/// Targets from every registered strategy are concatenated in registration
/// order (last write wins per symbol downstream, in `targets_to_order_intents`).
pub struct StrategyHost {
    mode: ShadowMode,
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyHost {
    pub fn new(mode: ShadowMode) -> Self {
        Self {
            mode,
            strategies: Vec::new(),
        }
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) -> Result<(), StrategyHostError> {
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn on_bar(&mut self, ctx: &StrategyContext) -> Result<HostBarResult, StrategyHostError> {
        let mut targets = Vec::new();
        for s in self.strategies.iter_mut() {
            targets.extend(s.on_bar(ctx).targets);
        }
        Ok(HostBarResult {
            intents: HostIntents {
                output: StrategyOutput::new(targets),
                mode: self.mode,
            },
        })
    }
}
