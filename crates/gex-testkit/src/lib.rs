use anyhow::{Context, Result};
use gex_schemas::BrokerSnapshot;
use std::fs;

pub fn load_broker_snapshot_json(path: &str) -> Result<BrokerSnapshot> {
    let s = fs::read_to_string(path).with_context(|| format!("read snapshot: {path}"))?;
    let snap: BrokerSnapshot = serde_json::from_str(&s).context("parse snapshot json")?;
    Ok(snap)
}

mod recovery;

pub use recovery::{recover_outbox_against_broker, FakeBroker, RecoveryReport};

pub mod artifacts;
pub mod orchestrator;
pub mod paper_broker;
pub mod strategy;

pub use artifacts::{init_run_artifacts, ArtifactList, InitRunArtifactsArgs, RunManifest};
pub use orchestrator::{Orchestrator, OrchestratorBar, OrchestratorConfig, OrchestratorReport};
pub use paper_broker::PaperBroker as OrchestratorPaperBroker;
pub use strategy::{
    BarStub, HostBarResult, HostIntents, RecentBarsWindow, ShadowMode, Strategy, StrategyContext,
    StrategyHost, StrategyHostError, StrategySpec,
};
