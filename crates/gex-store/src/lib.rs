//! StateStore: durable persistence for run provenance, the outbox/inbox pair
//! that makes order dispatch and fill application crash-safe, the broker
//! order-id map, and per-profile mutable state (positions, drawdown,
//! cursors).
//!
//! Backed by Postgres via `sqlx`. Every query is built at runtime (no
//! `sqlx::query!` macro) so this crate compiles without a live database.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "GEX_DATABASE_URL";

/// Connect to Postgres using `GEX_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Test helper: connect from env and ensure migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_runs_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='runs'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_runs_table: exists,
    })
}

/// Count LIVE runs that are operationally "active": ARMED or RUNNING.
/// Used by the CLI to refuse migrating under a live/armed DB.
pub async fn count_active_live_runs(pool: &PgPool) -> Result<i64> {
    let st = status(pool).await?;
    if !st.has_runs_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from runs
        where mode = 'LIVE'
          and status in ('ARMED','RUNNING')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_active_live_runs failed")?;

    Ok(n)
}

pub async fn has_active_live_runs(pool: &PgPool) -> Result<bool> {
    Ok(count_active_live_runs(pool).await? > 0)
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_id: Uuid,
    pub engine_id: String,
    pub mode: String, // PAPER | LIVE
    pub started_at_utc: DateTime<Utc>,
    pub git_hash: String,
    pub config_hash: String,
    pub config_json: Value,
    pub host_fingerprint: String,
}

/// Insert a new run row (status defaults to CREATED).
pub async fn insert_run(pool: &PgPool, run: &NewRun) -> Result<()> {
    sqlx::query(
        r#"
        insert into runs (
          run_id, engine_id, mode, started_at_utc, git_hash, config_hash, config_json, host_fingerprint
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8
        )
        "#,
    )
    .bind(run.run_id)
    .bind(&run.engine_id)
    .bind(&run.mode)
    .bind(run.started_at_utc)
    .bind(&run.git_hash)
    .bind(&run.config_hash)
    .bind(&run.config_json)
    .bind(&run.host_fingerprint)
    .execute(pool)
    .await
    .context("insert_run failed")?;

    Ok(())
}

#[derive(Debug, Clone)]
pub enum RunStatus {
    Created,
    Armed,
    Running,
    Stopped,
    Halted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Created => "CREATED",
            RunStatus::Armed => "ARMED",
            RunStatus::Running => "RUNNING",
            RunStatus::Stopped => "STOPPED",
            RunStatus::Halted => "HALTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(RunStatus::Created),
            "ARMED" => Ok(RunStatus::Armed),
            "RUNNING" => Ok(RunStatus::Running),
            "STOPPED" => Ok(RunStatus::Stopped),
            "HALTED" => Ok(RunStatus::Halted),
            other => Err(anyhow!("invalid run status: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: Uuid,
    pub engine_id: String,
    pub mode: String,
    pub started_at_utc: DateTime<Utc>,
    pub git_hash: String,
    pub config_hash: String,
    pub config_json: Value,
    pub host_fingerprint: String,
    pub status: RunStatus,
    pub armed_at_utc: Option<DateTime<Utc>>,
    pub running_at_utc: Option<DateTime<Utc>>,
    pub stopped_at_utc: Option<DateTime<Utc>>,
    pub halted_at_utc: Option<DateTime<Utc>>,
    pub last_heartbeat_utc: Option<DateTime<Utc>>,
}

pub async fn fetch_run(pool: &PgPool, run_id: Uuid) -> Result<RunRow> {
    let row = sqlx::query(
        r#"
        select
          run_id, engine_id, mode, started_at_utc, git_hash, config_hash,
          config_json, host_fingerprint, status, armed_at_utc, running_at_utc,
          stopped_at_utc, halted_at_utc, last_heartbeat_utc
        from runs
        where run_id = $1
        "#,
    )
    .bind(run_id)
    .fetch_one(pool)
    .await
    .context("fetch_run failed")?;

    Ok(RunRow {
        run_id: row.try_get("run_id")?,
        engine_id: row.try_get("engine_id")?,
        mode: row.try_get("mode")?,
        started_at_utc: row.try_get("started_at_utc")?,
        git_hash: row.try_get("git_hash")?,
        config_hash: row.try_get("config_hash")?,
        config_json: row.try_get("config_json")?,
        host_fingerprint: row.try_get("host_fingerprint")?,
        status: RunStatus::parse(&row.try_get::<String, _>("status")?)?,
        armed_at_utc: row.try_get("armed_at_utc")?,
        running_at_utc: row.try_get("running_at_utc")?,
        stopped_at_utc: row.try_get("stopped_at_utc")?,
        halted_at_utc: row.try_get("halted_at_utc")?,
        last_heartbeat_utc: row.try_get("last_heartbeat_utc")?,
    })
}

/// Verify that a run is bound to (engine_id, mode, config_hash).
pub async fn assert_run_binding(
    pool: &PgPool,
    run_id: Uuid,
    engine_id: &str,
    mode: &str,
    config_hash: &str,
) -> Result<()> {
    let r = fetch_run(pool, run_id).await?;
    if r.engine_id != engine_id {
        return Err(anyhow!("run binding mismatch: engine_id"));
    }
    if r.mode != mode {
        return Err(anyhow!("run binding mismatch: mode"));
    }
    if r.config_hash != config_hash {
        return Err(anyhow!("run binding mismatch: config_hash"));
    }
    Ok(())
}

fn cfg_bool(v: &Value, ptr: &str, default: bool) -> bool {
    v.pointer(ptr).and_then(|x| x.as_bool()).unwrap_or(default)
}

fn cfg_f64(v: &Value, ptr: &str) -> Option<f64> {
    v.pointer(ptr).and_then(|x| x.as_f64())
}

/// Pre-flight gate before arming a run.
///
/// Does not talk to the broker and does not mutate DB state beyond the arm
/// transition itself. Reconcile cleanliness is checked via
/// `sys_reconcile_checkpoint`, never `audit_events` — a forged audit event
/// with `event_type='CLEAN'` cannot satisfy this gate.
pub async fn arm_preflight(pool: &PgPool, run_id: Uuid) -> Result<()> {
    let r = fetch_run(pool, run_id).await?;
    let cfg = r.config_json.clone();
    let is_live = r.mode.eq_ignore_ascii_case("LIVE");

    let require_clean_reconcile = cfg_bool(&cfg, "/arming/require_clean_reconcile", true);

    if is_live && require_clean_reconcile {
        let checkpoint = reconcile_checkpoint_load_latest(pool, run_id).await?;
        match checkpoint.as_ref().map(|c| c.verdict.as_str()) {
            Some("CLEAN") => {}
            Some(other) => {
                return Err(anyhow!(
                    "arm_preflight reconcile not clean: latest checkpoint verdict='{}'",
                    other
                ));
            }
            None => {
                return Err(anyhow!(
                    "arm_preflight requires clean reconcile checkpoint: no \
                     sys_reconcile_checkpoint row found for run"
                ));
            }
        }
    }

    if is_live {
        let daily_loss_limit = cfg_f64(&cfg, "/risk/daily_loss_limit").unwrap_or(0.0);
        if daily_loss_limit <= 0.0 {
            return Err(anyhow!(
                "risk.daily_loss_limit is zero (must be > 0 for LIVE)"
            ));
        }
    }

    arm_run(pool, run_id).await
}

/// Arm a run: CREATED/STOPPED -> ARMED.
pub async fn arm_run(pool: &PgPool, run_id: Uuid) -> Result<()> {
    let r = fetch_run(pool, run_id).await?;
    match r.status {
        RunStatus::Created | RunStatus::Stopped => {}
        _ => return Err(anyhow!("arm_run invalid state: {}", r.status.as_str())),
    }

    let res = sqlx::query(
        r#"
        update runs
        set status = 'ARMED', armed_at_utc = now()
        where run_id = $1
        "#,
    )
    .bind(run_id)
    .execute(pool)
    .await;

    match res {
        Ok(_) => Ok(()),
        Err(e) => {
            if is_unique_constraint_violation(&e, "uq_live_engine_active_run") {
                return Err(anyhow!("unique active LIVE constraint"));
            }
            Err(anyhow::Error::new(e).context("arm_run update failed"))
        }
    }
}

fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

/// Begin a run: ARMED -> RUNNING.
pub async fn begin_run(pool: &PgPool, run_id: Uuid) -> Result<()> {
    let r = fetch_run(pool, run_id).await?;
    match r.status {
        RunStatus::Armed => {}
        _ => return Err(anyhow!("begin_run invalid state: {}", r.status.as_str())),
    }

    sqlx::query("update runs set status = 'RUNNING', running_at_utc = now() where run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await
        .context("begin_run update failed")?;

    Ok(())
}

/// Stop a run: ARMED/RUNNING -> STOPPED.
pub async fn stop_run(pool: &PgPool, run_id: Uuid) -> Result<()> {
    let r = fetch_run(pool, run_id).await?;
    match r.status {
        RunStatus::Armed | RunStatus::Running => {}
        _ => return Err(anyhow!("stop_run invalid state: {}", r.status.as_str())),
    }

    sqlx::query("update runs set status = 'STOPPED', stopped_at_utc = now() where run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await
        .context("stop_run update failed")?;

    Ok(())
}

/// Halt a run: ANY -> HALTED (sticky; always succeeds if the run exists).
pub async fn halt_run(pool: &PgPool, run_id: Uuid) -> Result<()> {
    sqlx::query("update runs set status = 'HALTED', halted_at_utc = now() where run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await
        .context("halt_run update failed")?;

    Ok(())
}

/// Heartbeat: only valid while RUNNING.
pub async fn heartbeat_run(pool: &PgPool, run_id: Uuid) -> Result<()> {
    let r = fetch_run(pool, run_id).await?;
    match r.status {
        RunStatus::Running => {}
        _ => {
            return Err(anyhow!(
                "heartbeat_run invalid state: {}",
                r.status.as_str()
            ))
        }
    }

    sqlx::query("update runs set last_heartbeat_utc = now() where run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await
        .context("heartbeat_run update failed")?;

    Ok(())
}

/// Compute whether a RUNNING run's heartbeat is stale as of `now`.
///
/// - Not RUNNING => false.
/// - RUNNING with no heartbeat ever recorded => true (unsafe).
///
/// `now` is caller-supplied rather than read from the wall clock so callers
/// can test this deterministically.
pub async fn deadman_expired(
    pool: &PgPool,
    run_id: Uuid,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    if ttl_seconds <= 0 {
        return Err(anyhow!("deadman ttl_seconds must be > 0"));
    }

    let r = fetch_run(pool, run_id).await?;
    if r.status.as_str() != "RUNNING" {
        return Ok(false);
    }

    let last = match r.last_heartbeat_utc {
        Some(t) => t,
        None => return Ok(true),
    };

    let age = now.signed_duration_since(last).num_seconds();
    Ok(age > ttl_seconds)
}

/// If `run_id` is RUNNING and its heartbeat is expired as of `now`, HALT it
/// (sticky) and return true. Otherwise return false.
pub async fn enforce_deadman_or_halt(
    pool: &PgPool,
    run_id: Uuid,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    if !deadman_expired(pool, run_id, ttl_seconds, now).await? {
        return Ok(false);
    }

    let r = fetch_run(pool, run_id).await?;
    if r.status.as_str() == "RUNNING" {
        halt_run(pool, run_id).await?;
        return Ok(true);
    }

    Ok(false)
}

// ---------------------------------------------------------------------------
// Per-profile mutable state (positions, drawdown, cursors)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProfileStateRow {
    pub profile_id: String,
    pub positions_json: Value,
    pub drawdown_watermark_micros: i64,
    pub cursor_json: Value,
    pub updated_at_utc: DateTime<Utc>,
}

/// Upsert a profile's persisted state. Callers own serialization of their own
/// in-process state shape to/from `positions_json`/`cursor_json`.
pub async fn save_profile_state(
    pool: &PgPool,
    profile_id: &str,
    positions_json: &Value,
    drawdown_watermark_micros: i64,
    cursor_json: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into profile_state (profile_id, positions_json, drawdown_watermark_micros, cursor_json, updated_at_utc)
        values ($1, $2, $3, $4, now())
        on conflict (profile_id) do update
            set positions_json             = excluded.positions_json,
                drawdown_watermark_micros  = excluded.drawdown_watermark_micros,
                cursor_json                = excluded.cursor_json,
                updated_at_utc             = excluded.updated_at_utc
        "#,
    )
    .bind(profile_id)
    .bind(positions_json)
    .bind(drawdown_watermark_micros)
    .bind(cursor_json)
    .execute(pool)
    .await
    .context("save_profile_state failed")?;

    Ok(())
}

pub async fn load_profile_state(pool: &PgPool, profile_id: &str) -> Result<Option<ProfileStateRow>> {
    let row = sqlx::query(
        r#"
        select profile_id, positions_json, drawdown_watermark_micros, cursor_json, updated_at_utc
        from profile_state
        where profile_id = $1
        "#,
    )
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .context("load_profile_state failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(ProfileStateRow {
        profile_id: row.try_get("profile_id")?,
        positions_json: row.try_get("positions_json")?,
        drawdown_watermark_micros: row.try_get("drawdown_watermark_micros")?,
        cursor_json: row.try_get("cursor_json")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    }))
}

pub async fn list_profile_ids(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query("select profile_id from profile_state order by profile_id asc")
        .fetch_all(pool)
        .await
        .context("list_profile_ids failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(row.try_get::<String, _>("profile_id")?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// OMS Outbox / Inbox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub outbox_id: i64,
    pub run_id: Uuid,
    pub idempotency_key: String,
    pub order_json: Value,
    pub status: String, // PENDING | CLAIMED | SENT | ACKED | FAILED
    pub created_at_utc: DateTime<Utc>,
    pub sent_at_utc: Option<DateTime<Utc>>,
    pub claimed_at_utc: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InboxRow {
    pub inbox_id: i64,
    pub run_id: Uuid,
    pub broker_message_id: String,
    pub message_json: Value,
    pub received_at_utc: DateTime<Utc>,
    pub applied_at_utc: Option<DateTime<Utc>>,
}

fn outbox_row_from(row: sqlx::postgres::PgRow) -> Result<OutboxRow> {
    Ok(OutboxRow {
        outbox_id: row.try_get("outbox_id")?,
        run_id: row.try_get("run_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        order_json: row.try_get("order_json")?,
        status: row.try_get("status")?,
        created_at_utc: row.try_get("created_at_utc")?,
        sent_at_utc: row.try_get("sent_at_utc")?,
        claimed_at_utc: row.try_get("claimed_at_utc")?,
        claimed_by: row.try_get("claimed_by")?,
    })
}

/// Enqueue an order intent into the outbox.
///
/// Idempotent: if `idempotency_key` already exists, returns `Ok(false)` and
/// does not create a second row, so a restart can never double-submit.
pub async fn outbox_enqueue(
    pool: &PgPool,
    run_id: Uuid,
    idempotency_key: &str,
    order_json: Value,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into oms_outbox (run_id, idempotency_key, order_json, status)
        values ($1, $2, $3, 'PENDING')
        on conflict (idempotency_key) do nothing
        returning outbox_id
        "#,
    )
    .bind(run_id)
    .bind(idempotency_key)
    .bind(order_json)
    .fetch_optional(pool)
    .await
    .context("outbox_enqueue failed")?;

    Ok(row.is_some())
}

/// Atomically claim up to `batch_size` PENDING rows for exclusive dispatch,
/// using `FOR UPDATE SKIP LOCKED` so concurrent dispatchers never claim the
/// same row.
///
/// RT-1: gated behind `runtime-claim` so only the pipeline's single
/// dispatcher loop can compile against this function.
#[cfg(feature = "runtime-claim")]
pub async fn outbox_claim_batch(
    pool: &PgPool,
    batch_size: i64,
    dispatcher_id: &str,
) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(
        r#"
        with to_claim as (
            select outbox_id
            from oms_outbox
            where status = 'PENDING'
            order by outbox_id asc
            limit $1
            for update skip locked
        )
        update oms_outbox
           set status = 'CLAIMED', claimed_at_utc = now(), claimed_by = $2
         where outbox_id in (select outbox_id from to_claim)
        returning outbox_id, run_id, idempotency_key, order_json, status,
                  created_at_utc, sent_at_utc, claimed_at_utc, claimed_by
        "#,
    )
    .bind(batch_size)
    .bind(dispatcher_id)
    .fetch_all(pool)
    .await
    .context("outbox_claim_batch failed")?;

    rows.into_iter().map(outbox_row_from).collect()
}

/// Release a CLAIMED row back to PENDING. Returns true if it was released.
pub async fn outbox_release_claim(pool: &PgPool, idempotency_key: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update oms_outbox
           set status = 'PENDING', claimed_at_utc = null, claimed_by = null
         where idempotency_key = $1 and status = 'CLAIMED'
        returning outbox_id
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_release_claim failed")?;

    Ok(row.is_some())
}

pub async fn outbox_fetch_by_idempotency_key(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<Option<OutboxRow>> {
    let row = sqlx::query(
        r#"
        select outbox_id, run_id, idempotency_key, order_json, status,
               created_at_utc, sent_at_utc, claimed_at_utc, claimed_by
        from oms_outbox
        where idempotency_key = $1
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_fetch_by_idempotency_key failed")?;

    row.map(outbox_row_from).transpose()
}

/// Mark a CLAIMED row SENT. Only CLAIMED rows can transition — a dispatcher
/// that never claimed cannot mark SENT, which keeps claim/dispatch coupled.
pub async fn outbox_mark_sent(pool: &PgPool, idempotency_key: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update oms_outbox
           set status = 'SENT', sent_at_utc = coalesce(sent_at_utc, now())
         where idempotency_key = $1 and status = 'CLAIMED'
        returning outbox_id
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_mark_sent failed")?;

    Ok(row.is_some())
}

pub async fn outbox_mark_acked(pool: &PgPool, idempotency_key: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update oms_outbox set status = 'ACKED'
        where idempotency_key = $1
        returning outbox_id
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_mark_acked failed")?;

    Ok(row.is_some())
}

pub async fn outbox_mark_failed(pool: &PgPool, idempotency_key: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update oms_outbox set status = 'FAILED'
         where idempotency_key = $1 and status = 'CLAIMED'
        returning outbox_id
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await
    .context("outbox_mark_failed failed")?;

    Ok(row.is_some())
}

/// Recovery query: every outbox row for `run_id` not yet ACKED.
pub async fn outbox_list_unacked_for_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(
        r#"
        select outbox_id, run_id, idempotency_key, order_json, status,
               created_at_utc, sent_at_utc, claimed_at_utc, claimed_by
        from oms_outbox
        where run_id = $1 and status in ('PENDING','CLAIMED','SENT','FAILED')
        order by outbox_id asc
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("outbox_list_unacked_for_run failed")?;

    rows.into_iter().map(outbox_row_from).collect()
}

// ---------------------------------------------------------------------------
// Global arm state
// ---------------------------------------------------------------------------

/// Persist the current arm state (singleton row). `reason` is the
/// `DisarmReason` variant name when `state == "DISARMED"`.
pub async fn persist_arm_state(pool: &PgPool, state: &str, reason: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        insert into sys_arm_state (sentinel_id, state, reason, updated_at_utc)
        values (1, $1, $2, now())
        on conflict (sentinel_id) do update
            set state = excluded.state, reason = excluded.reason, updated_at_utc = excluded.updated_at_utc
        "#,
    )
    .bind(state)
    .bind(reason)
    .execute(pool)
    .await
    .context("persist_arm_state failed")?;
    Ok(())
}

/// Load the last persisted arm state. `None` means fresh system: caller
/// should treat as DISARMED / boot default.
pub async fn load_arm_state(pool: &PgPool) -> Result<Option<(String, Option<String>)>> {
    let row: Option<(String, Option<String>)> =
        sqlx::query_as("select state, reason from sys_arm_state where sentinel_id = 1")
            .fetch_optional(pool)
            .await
            .context("load_arm_state failed")?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Inbox (broker message dedupe + crash-recovery replay)
// ---------------------------------------------------------------------------

/// Insert a broker message into the inbox, deduped on `broker_message_id`.
///
/// Caller contract:
/// ```text
/// if inbox_insert_deduped(pool, run_id, msg_id, json).await? {
///     apply_fill_to_portfolio(json);      // idempotent apply
///     inbox_mark_applied(pool, msg_id).await?;
/// }
/// ```
/// A crash between insert and mark_applied surfaces the row in
/// `inbox_load_unapplied_for_run` for replay.
pub async fn inbox_insert_deduped(
    pool: &PgPool,
    run_id: Uuid,
    broker_message_id: &str,
    message_json: Value,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into oms_inbox (run_id, broker_message_id, message_json)
        values ($1, $2, $3)
        on conflict (broker_message_id) do nothing
        returning inbox_id
        "#,
    )
    .bind(run_id)
    .bind(broker_message_id)
    .bind(message_json)
    .fetch_optional(pool)
    .await
    .context("inbox_insert_deduped failed")?;

    Ok(row.is_some())
}

pub async fn inbox_mark_applied(pool: &PgPool, broker_message_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        update oms_inbox set applied_at_utc = now()
        where broker_message_id = $1 and applied_at_utc is null
        "#,
    )
    .bind(broker_message_id)
    .execute(pool)
    .await
    .context("inbox_mark_applied failed")?;
    Ok(())
}

pub async fn inbox_load_unapplied_for_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<InboxRow>> {
    let rows = sqlx::query(
        r#"
        select inbox_id, run_id, broker_message_id, message_json, received_at_utc, applied_at_utc
        from oms_inbox
        where run_id = $1 and applied_at_utc is null
        order by inbox_id asc
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("inbox_load_unapplied_for_run failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(InboxRow {
            inbox_id: row.try_get("inbox_id")?,
            run_id: row.try_get("run_id")?,
            broker_message_id: row.try_get("broker_message_id")?,
            message_json: row.try_get("message_json")?,
            received_at_utc: row.try_get("received_at_utc")?,
            applied_at_utc: row.try_get("applied_at_utc")?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Broker order ID map persistence
// ---------------------------------------------------------------------------

/// Persist (or update) an `internal_id -> broker_id` mapping after a
/// successful broker submit.
pub async fn broker_map_upsert(pool: &PgPool, internal_id: &str, broker_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into broker_order_map (internal_id, broker_id)
        values ($1, $2)
        on conflict (internal_id) do update set broker_id = excluded.broker_id
        "#,
    )
    .bind(internal_id)
    .bind(broker_id)
    .execute(pool)
    .await
    .context("broker_map_upsert failed")?;
    Ok(())
}

/// Remove a mapping once the order reaches a terminal state. Idempotent.
pub async fn broker_map_remove(pool: &PgPool, internal_id: &str) -> Result<()> {
    sqlx::query("delete from broker_order_map where internal_id = $1")
        .bind(internal_id)
        .execute(pool)
        .await
        .context("broker_map_remove failed")?;
    Ok(())
}

/// Load all live pairs, ordered by registration time, to repopulate the
/// in-process `BrokerOrderMap` at daemon startup.
pub async fn broker_map_load(pool: &PgPool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query("select internal_id, broker_id from broker_order_map order by registered_at_utc asc")
        .fetch_all(pool)
        .await
        .context("broker_map_load failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push((
            row.try_get::<String, _>("internal_id")?,
            row.try_get::<String, _>("broker_id")?,
        ));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Reconcile checkpoints
// ---------------------------------------------------------------------------

/// A persisted reconcile checkpoint. `arm_preflight` checks this table, not
/// `audit_events` — a forged audit event cannot satisfy arming.
#[derive(Debug, Clone)]
pub struct ReconcileCheckpoint {
    pub checkpoint_id: i64,
    pub run_id: Uuid,
    pub verdict: String, // CLEAN | DIRTY
    pub snapshot_watermark_ms: i64,
    pub result_hash: String,
    pub created_at_utc: DateTime<Utc>,
}

pub async fn reconcile_checkpoint_write(
    pool: &PgPool,
    run_id: Uuid,
    verdict: &str,
    snapshot_watermark_ms: i64,
    result_hash: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into sys_reconcile_checkpoint (run_id, verdict, snapshot_watermark_ms, result_hash)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(run_id)
    .bind(verdict)
    .bind(snapshot_watermark_ms)
    .bind(result_hash)
    .execute(pool)
    .await
    .context("reconcile_checkpoint_write failed")?;
    Ok(())
}

pub async fn reconcile_checkpoint_load_latest(
    pool: &PgPool,
    run_id: Uuid,
) -> Result<Option<ReconcileCheckpoint>> {
    let row = sqlx::query(
        r#"
        select checkpoint_id, run_id, verdict, snapshot_watermark_ms, result_hash, created_at_utc
        from sys_reconcile_checkpoint
        where run_id = $1
        order by created_at_utc desc
        limit 1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("reconcile_checkpoint_load_latest failed")?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(ReconcileCheckpoint {
        checkpoint_id: row.try_get("checkpoint_id")?,
        run_id: row.try_get("run_id")?,
        verdict: row.try_get("verdict")?,
        snapshot_watermark_ms: row.try_get("snapshot_watermark_ms")?,
        result_hash: row.try_get("result_hash")?,
        created_at_utc: row.try_get("created_at_utc")?,
    }))
}
