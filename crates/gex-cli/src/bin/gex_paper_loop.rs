//! Offline paper-trading loop driven by the testkit `Orchestrator`.
//!
//! Reads a JSON-lines bar feed (one `OrchestratorBar` per line), replays it
//! through the full signal-to-execution stack with no live broker, and
//! writes run artifacts under `--exports-root`. Gated behind the `testkit`
//! feature — this binary is not part of a production deployment.

use anyhow::{bail, Context, Result};
use clap::Parser;
use gex_testkit::{Orchestrator, OrchestratorBar, OrchestratorConfig};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gex_paper_loop")]
#[command(about = "Replay a bar feed through the paper-trading orchestrator")]
struct Args {
    /// Path to a JSON-lines file of OrchestratorBar records.
    #[arg(long)]
    bars: PathBuf,

    /// Directory to write run artifacts (manifest.json, audit.jsonl, ...).
    #[arg(long)]
    exports_root: PathBuf,

    /// Enable the integrity gap/stale-feed engine for this run.
    #[arg(long, default_value_t = false)]
    integrity: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = fs::read_to_string(&args.bars)
        .with_context(|| format!("read bar feed: {}", args.bars.display()))?;

    let bars: Vec<OrchestratorBar> = raw
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).with_context(|| format!("parse bar line: {l}")))
        .collect::<Result<_>>()?;

    if bars.is_empty() {
        bail!("bar feed {} contained no bars", args.bars.display());
    }

    let mut cfg = OrchestratorConfig::test_defaults();
    cfg.integrity_enabled = args.integrity;

    let mut orch = Orchestrator::new(cfg);
    let report = orch.run(&bars, &args.exports_root)?;

    println!("run_id={}", orch.run_id());
    println!("bars_processed={}", report.bars_processed);
    println!("fills_count={}", report.fills_count);
    println!("broker_acks={}", report.broker_acks);
    println!("execution_blocked={}", report.execution_blocked);
    println!("run_dir={}", report.run_dir.display());

    Ok(())
}
