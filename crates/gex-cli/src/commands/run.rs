//! Run-lifecycle command handlers.
//!
//! Covers all subcommands of `gex-cli run`: start, arm, begin, stop, halt,
//! heartbeat, status, deadman-check, deadman-enforce.

use anyhow::{Context, Result};
use chrono::Utc;
use gex_config::{report_unused_keys, UnusedKeyPolicy};
use serde_json::Value;
use std::process::Command;
use uuid::Uuid;

use super::parse_config_mode;

// ---------------------------------------------------------------------------
// run start
// ---------------------------------------------------------------------------

pub async fn run_start(engine: String, mode: String, config_paths: Vec<String>) -> Result<()> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = gex_config::load_layered_yaml(&path_refs)?;

    let cfg_mode = parse_config_mode(&mode)?;
    let policy = match cfg_mode {
        gex_config::ConfigMode::Live => UnusedKeyPolicy::Fail,
        gex_config::ConfigMode::Paper | gex_config::ConfigMode::Backtest => UnusedKeyPolicy::Warn,
    };

    let report = report_unused_keys(cfg_mode, &loaded.config_json, policy)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS mode={} unused_leaf_keys={}",
            mode.to_uppercase(),
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
        let extra = report.unused_leaf_pointers.len().saturating_sub(50);
        if extra > 0 {
            eprintln!("  ... and {} more", extra);
        }
    }

    let pool = gex_store::connect_from_env().await?;

    let git_hash = get_git_hash().unwrap_or_else(|| "UNKNOWN".to_string());
    let run_id = derive_cli_run_id(&engine, &mode, &loaded.config_hash, &git_hash);
    let host_fp = host_fingerprint();

    let new_run = gex_store::NewRun {
        run_id,
        engine_id: engine.clone(),
        mode: mode.clone(),
        started_at_utc: Utc::now(),
        git_hash: git_hash.clone(),
        config_hash: loaded.config_hash.clone(),
        config_json: loaded.config_json.clone(),
        host_fingerprint: host_fp.clone(),
    };

    gex_store::insert_run(&pool, &new_run).await?;

    println!("run_id={}", run_id);
    println!("engine_id={}", engine);
    println!("mode={}", mode);
    println!("git_hash={}", git_hash);
    println!("config_hash={}", loaded.config_hash);
    println!("host_fingerprint={}", host_fp);

    Ok(())
}

// ---------------------------------------------------------------------------
// run arm
// ---------------------------------------------------------------------------

pub async fn run_arm(run_id: String, confirm: Option<String>) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;

    let r = gex_store::fetch_run(&pool, run_uuid).await?;
    enforce_manual_confirmation_if_required(&r, confirm.as_deref())?;

    gex_store::arm_preflight(&pool, run_uuid).await?;
    println!("armed=true run_id={} status=ARMED", run_uuid);

    Ok(())
}

// ---------------------------------------------------------------------------
// run begin
// ---------------------------------------------------------------------------

pub async fn run_begin(run_id: String) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    gex_store::begin_run(&pool, run_uuid).await?;
    println!("begun=true run_id={} status=RUNNING", run_uuid);
    Ok(())
}

// ---------------------------------------------------------------------------
// run stop
// ---------------------------------------------------------------------------

pub async fn run_stop(run_id: String) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    gex_store::stop_run(&pool, run_uuid).await?;
    println!("stopped=true run_id={} status=STOPPED", run_uuid);
    Ok(())
}

// ---------------------------------------------------------------------------
// run halt
// ---------------------------------------------------------------------------

pub async fn run_halt(run_id: String, reason: String) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    gex_store::halt_run(&pool, run_uuid).await?;
    println!(
        "halted=true run_id={} status=HALTED reason={}",
        run_uuid, reason
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// run heartbeat
// ---------------------------------------------------------------------------

pub async fn run_heartbeat(run_id: String) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    gex_store::heartbeat_run(&pool, run_uuid).await?;
    println!("heartbeat=true run_id={}", run_uuid);
    Ok(())
}

// ---------------------------------------------------------------------------
// run status
// ---------------------------------------------------------------------------

pub async fn run_status(run_id: String) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    let r = gex_store::fetch_run(&pool, run_uuid).await?;
    println!("run_id={}", r.run_id);
    println!("engine_id={}", r.engine_id);
    println!("mode={}", r.mode);
    println!("status={}", r.status.as_str());
    println!("started_at_utc={}", r.started_at_utc.to_rfc3339());
    println!("armed_at_utc={}", opt_dt(&r.armed_at_utc));
    println!("running_at_utc={}", opt_dt(&r.running_at_utc));
    println!("stopped_at_utc={}", opt_dt(&r.stopped_at_utc));
    println!("halted_at_utc={}", opt_dt(&r.halted_at_utc));
    println!("last_heartbeat_utc={}", opt_dt(&r.last_heartbeat_utc));
    println!("git_hash={}", r.git_hash);
    println!("config_hash={}", r.config_hash);
    println!("host_fingerprint={}", r.host_fingerprint);
    Ok(())
}

// ---------------------------------------------------------------------------
// run deadman-check
// ---------------------------------------------------------------------------

pub async fn run_deadman_check(run_id: String, ttl_seconds: i64) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    let expired = gex_store::deadman_expired(&pool, run_uuid, ttl_seconds, Utc::now()).await?;
    println!(
        "deadman_expired={} run_id={} ttl_seconds={}",
        expired, run_uuid, ttl_seconds
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// run deadman-enforce
// ---------------------------------------------------------------------------

pub async fn run_deadman_enforce(run_id: String, ttl_seconds: i64) -> Result<()> {
    let pool = gex_store::connect_from_env().await?;
    let run_uuid = Uuid::parse_str(&run_id).context("invalid run_id uuid")?;
    let halted = gex_store::enforce_deadman_or_halt(&pool, run_uuid, ttl_seconds, Utc::now()).await?;
    println!(
        "deadman_halted={} run_id={} ttl_seconds={}",
        halted, run_uuid, ttl_seconds
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Run-ID derivation (D1-1)
// ---------------------------------------------------------------------------

/// Derive a deterministic run ID from the combination of engine identity and
/// loaded configuration. All inputs are caller-provided with no wall-clock
/// or RNG dependency.
///
/// **No RNG.** Uses `Uuid::new_v5` (SHA-1 over the DNS namespace).
///
/// Inputs:
///   `engine_id`   — engine identifier string (e.g. `"swing_v1"`)
///   `mode`        — `"live"` | `"paper"` | `"backtest"`
///   `config_hash` — SHA-256 hex of the loaded config JSON (from `gex_config`)
///   `git_hash`    — short git commit hash of the running binary
///
/// Omitted from this version (reserved for future patches):
///   `asof_utc`      — wall-clock at run start; requires a `TimeSource`
///                     abstraction (D1-3) before it can be made deterministic.
///   `universe_hash` — symbol-set hash; not yet defined in schema.
///
/// The derivation prefix `"gex-cli.run.v1"` scopes the hash within the DNS
/// namespace, preventing collisions with any other UUIDv5 uses in the system.
fn derive_cli_run_id(engine_id: &str, mode: &str, config_hash: &str, git_hash: &str) -> Uuid {
    let data = format!(
        "gex-cli.run.v1|{}|{}|{}|{}",
        engine_id, mode, config_hash, git_hash
    );
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn enforce_manual_confirmation_if_required(
    run: &gex_store::RunRow,
    confirm: Option<&str>,
) -> Result<()> {
    if run.mode.to_uppercase() != "LIVE" {
        return Ok(());
    }

    let require = run
        .config_json
        .pointer("/arming/require_manual_confirmation")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    if !require {
        return Ok(());
    }

    let fmt = run
        .config_json
        .pointer("/arming/confirmation_format")
        .and_then(|v| v.as_str())
        .unwrap_or("ARM LIVE {account_last4} {daily_loss_limit}");

    let account_last4 = run
        .config_json
        .pointer("/broker/account_last4")
        .and_then(|v| v.as_str())
        .unwrap_or("0000");

    let daily_loss_limit = run
        .config_json
        .pointer("/risk/daily_loss_limit")
        .map(|v| match v {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => "".to_string(),
        })
        .unwrap_or_default();

    let expected = fmt
        .replace("{account_last4}", account_last4)
        .replace("{daily_loss_limit}", daily_loss_limit.trim());

    let confirm = confirm
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "manual confirmation required for LIVE arming. expected: \"{}\" (use --confirm)",
                expected
            )
        })?;

    if confirm != expected {
        return Err(anyhow::anyhow!(
            "manual confirmation mismatch. expected: \"{}\" got: \"{}\"",
            expected,
            confirm
        ));
    }

    Ok(())
}

/// Best-effort git hash (short).
fn get_git_hash() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8(out.stdout).ok()?;
    Some(s.trim().to_string())
}

fn host_fingerprint() -> String {
    let hostname = std::env::var("COMPUTERNAME").unwrap_or_else(|_| "UNKNOWN_HOST".to_string());
    let username = std::env::var("USERNAME").unwrap_or_else(|_| "UNKNOWN_USER".to_string());
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!("{hostname}|{username}|{os}|{arch}")
}

fn opt_dt(dt: &Option<chrono::DateTime<Utc>>) -> String {
    dt.as_ref().map(|d| d.to_rfc3339()).unwrap_or_default()
}
