//! Stage wiring, backpressure, and cancellation for the whole gateway
//! (spec §5). One task per profile consumes a bounded, per-profile queue in
//! submission order; different profiles run fully in parallel. Cross-profile
//! ordering is never guaranteed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use gex_config::{GateConfig, RiskConfig};
use gex_emergency::EmergencyController;
use gex_portfolio::ProfileState;
use gex_risk::RiskSnapshot;
use gex_schemas::{EmergencyStateKind, Signal};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::executor::ExecutorSink;
use crate::worker::{ProfileWorker, SignalOutcome};

/// Backpressure bound per profile queue. A producer blocked on a full queue
/// is the pipeline's only form of backpressure — there is no overflow drop.
const PROFILE_QUEUE_DEPTH: usize = 256;

/// One submitted signal plus the risk snapshot and emergency state it
/// should be evaluated against (taken by the caller at submission time, per
/// spec §4.2: "a consistent snapshot").
struct Job {
    signal: Signal,
    emergency_state: EmergencyStateKind,
    risk_snapshot: RiskSnapshot,
    reply: tokio::sync::oneshot::Sender<SignalOutcome>,
}

struct ProfileHandle {
    tx: mpsc::Sender<Job>,
}

/// Fans work out to one worker task per profile. `register_profile` must be
/// called before `submit` for that profile id; workers are spawned lazily
/// and torn down when `shutdown` cancels the shared token.
pub struct Pipeline<S: ExecutorSink + 'static> {
    profiles: Mutex<HashMap<String, ProfileHandle>>,
    cancel: CancellationToken,
    gate_config: GateConfig,
    risk_config: RiskConfig,
    chain_log_dir: PathBuf,
    make_sink: Arc<dyn Fn() -> S + Send + Sync>,
    emergency: Arc<Mutex<EmergencyController>>,
}

impl<S: ExecutorSink + 'static> Pipeline<S> {
    pub fn new(
        gate_config: GateConfig,
        risk_config: RiskConfig,
        chain_log_dir: impl Into<PathBuf>,
        make_sink: impl Fn() -> S + Send + Sync + 'static,
    ) -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            gate_config,
            risk_config,
            chain_log_dir: chain_log_dir.into(),
            make_sink: Arc::new(make_sink),
            emergency: Arc::new(Mutex::new(EmergencyController::new())),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current Emergency state, as last left by either a caller-supplied
    /// snapshot at submission time or a RiskSizer drawdown veto raised from
    /// inside a worker. Callers should read this before `submit` to decide
    /// whether to even attempt admission.
    pub async fn emergency_state(&self) -> EmergencyStateKind {
        self.emergency.lock().await.state()
    }

    /// Spawn the worker task for one profile if it doesn't already exist.
    pub async fn register_profile(&self, profile_state: ProfileState) {
        let profile_id = profile_state.profile_id.clone();
        let mut profiles = self.profiles.lock().await;
        if profiles.contains_key(&profile_id) {
            return;
        }

        let (tx, mut rx) = mpsc::channel::<Job>(PROFILE_QUEUE_DEPTH);
        let sink = (self.make_sink)();
        let chain_log_path = self.chain_log_dir.join(format!("{profile_id}.jsonl"));
        let mut worker = ProfileWorker::new(
            profile_state,
            self.gate_config.clone(),
            self.risk_config.clone(),
            sink,
            chain_log_path,
            Arc::clone(&self.emergency),
        );
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    job = rx.recv() => {
                        let Some(job) = job else { break };
                        let outcome = worker
                            .process_signal(&job.signal, job.emergency_state, &job.risk_snapshot, &cancel)
                            .await;
                        let _ = job.reply.send(outcome);
                    }
                }
            }
        });

        profiles.insert(profile_id, ProfileHandle { tx });
    }

    /// Submit one signal for processing, blocking (backpressure) if the
    /// profile's queue is full, and await its terminal outcome.
    pub async fn submit(
        &self,
        signal: Signal,
        emergency_state: EmergencyStateKind,
        risk_snapshot: RiskSnapshot,
    ) -> Result<SignalOutcome, SubmitError> {
        let tx = {
            let profiles = self.profiles.lock().await;
            profiles
                .get(&signal.profile_id)
                .map(|h| h.tx.clone())
                .ok_or_else(|| SubmitError::UnknownProfile(signal.profile_id.clone()))?
        };

        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        tx.send(Job {
            signal,
            emergency_state,
            risk_snapshot,
            reply: reply_tx,
        })
        .await
        .map_err(|_| SubmitError::WorkerGone)?;

        reply_rx.await.map_err(|_| SubmitError::WorkerGone)
    }

    /// Cooperative shutdown: every in-flight stage observes `cancel` at its
    /// next check and seals its chain as `rejected`/cancelled; no new work
    /// is accepted after this returns.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("profile {0} is not registered with this pipeline")]
    UnknownProfile(String),
    #[error("profile worker is no longer running")]
    WorkerGone,
}
