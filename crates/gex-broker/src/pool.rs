//! Managed set of broker sessions, one per active profile.
//!
//! `acquire` is fair-queued per profile (a `tokio::sync::Semaphore` admits
//! one leaseholder at a time, FIFO) and refuses once `max_positions_per_profile`
//! is reached. Reconciliation against the broker's own view runs every time
//! a session transitions to `Healthy`, delegating to `gex-reconcile` rather
//! than re-deriving drift logic here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gex_reconcile::{reconcile, LocalSnapshot, ReconcileReport};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::info;

use crate::adapter::BrokerAdapter;
use crate::session::{BackoffPolicy, HealthPolicy, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_positions_per_profile: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_positions_per_profile: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("timed out waiting for a session lease for profile {0}")]
    Timeout(String),
    #[error("no registered session for profile {0}")]
    NoSession(String),
    #[error("profile {profile} is at its position cap ({cap})")]
    PositionCapReached { profile: String, cap: u32 },
}

struct ProfileEntry<A: BrokerAdapter> {
    session: Mutex<Session<A>>,
    lease: Arc<Semaphore>,
    open_positions: Mutex<u32>,
}

/// A held lease on a profile's session. Dropping it releases the fair-queue
/// permit back to the pool; a session is never shared across concurrent
/// callers while a lease is outstanding.
pub struct SessionLease<A: BrokerAdapter> {
    profile: String,
    entry: Arc<ProfileEntry<A>>,
    _permit: OwnedSemaphorePermit,
}

impl<A: BrokerAdapter> SessionLease<A> {
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub async fn session(&self) -> tokio::sync::MutexGuard<'_, Session<A>> {
        self.entry.session.lock().await
    }

    /// Record that a position was opened under this lease, counting it
    /// against the profile's `max_positions_per_profile` cap.
    pub async fn note_position_opened(&self) {
        let mut open = self.entry.open_positions.lock().await;
        *open = open.saturating_add(1);
    }

    pub async fn note_position_closed(&self) {
        let mut open = self.entry.open_positions.lock().await;
        *open = open.saturating_sub(1);
    }
}

pub struct BrokerPool<A: BrokerAdapter> {
    config: PoolConfig,
    profiles: Mutex<HashMap<String, Arc<ProfileEntry<A>>>>,
}

impl<A: BrokerAdapter> BrokerPool<A> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register_profile(&self, profile: impl Into<String>, adapter: A) {
        self.register_profile_with_policies(
            profile,
            adapter,
            HealthPolicy::default(),
            BackoffPolicy::default(),
        )
        .await
    }

    pub async fn register_profile_with_policies(
        &self,
        profile: impl Into<String>,
        adapter: A,
        health: HealthPolicy,
        backoff: BackoffPolicy,
    ) {
        let profile = profile.into();
        let entry = Arc::new(ProfileEntry {
            session: Mutex::new(Session::with_policies(adapter, health, backoff)),
            lease: Arc::new(Semaphore::new(1)),
            open_positions: Mutex::new(0),
        });
        self.profiles.lock().await.insert(profile, entry);
    }

    async fn entry_for(&self, profile: &str) -> Result<Arc<ProfileEntry<A>>, AcquireError> {
        self.profiles
            .lock()
            .await
            .get(profile)
            .cloned()
            .ok_or_else(|| AcquireError::NoSession(profile.to_string()))
    }

    /// Acquire the single session for `profile`, fair-queued (FIFO) and
    /// bounded by the pool's `acquire_timeout`. Refuses immediately, without
    /// queueing, if the profile is already at its position cap.
    pub async fn acquire(&self, profile: &str) -> Result<SessionLease<A>, AcquireError> {
        let entry = self.entry_for(profile).await?;

        let open = *entry.open_positions.lock().await;
        if open >= self.config.max_positions_per_profile {
            return Err(AcquireError::PositionCapReached {
                profile: profile.to_string(),
                cap: self.config.max_positions_per_profile,
            });
        }

        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            Arc::clone(&entry.lease).acquire_owned(),
        )
        .await
        .map_err(|_| AcquireError::Timeout(profile.to_string()))?
        .expect("session semaphore is never closed");

        Ok(SessionLease {
            profile: profile.to_string(),
            entry,
            _permit: permit,
        })
    }

    /// Run one reconciliation pass for `profile` against the broker's own
    /// position/order view. Called on every session transition to `Healthy`;
    /// the pool's local view is authoritative-updated to match the broker
    /// afterward by the caller, per the differences in the returned report.
    pub async fn reconcile_profile(
        &self,
        lease: &SessionLease<A>,
        local: &LocalSnapshot,
    ) -> Result<ReconcileReport, AcquireError> {
        let mut session = lease.session().await;
        let broker = session
            .adapter_mut()
            .list_positions()
            .await
            .map_err(|_| AcquireError::NoSession(lease.profile.clone()))?;

        let report = reconcile(local, &broker);
        info!(
            profile = %lease.profile,
            clean = report.is_clean(),
            "broker pool reconciliation pass"
        );
        Ok(report)
    }
}
