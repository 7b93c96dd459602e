//! Per-session connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Healthy --heartbeat_fail--> Degraded
//!      ^                         |                 |                            |
//!      |                         |fail              |force_disconnect            |
//!      +---------backoff---------+                  v                            |
//!                                            Disconnected <---retry_exhausted----+
//! ```

use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::BrokerAdapter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Healthy,
    Degraded,
}

/// Heartbeat cadence and miss thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthPolicy {
    pub heartbeat_interval: Duration,
    pub degrade_after_misses: u32,
    pub disconnect_after_misses: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            degrade_after_misses: 3,
            disconnect_after_misses: 5,
        }
    }
}

/// Exponential reconnect backoff, capped, with a bounded attempt budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt number `attempt` (1-indexed). `None`
    /// once the attempt budget is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let secs = self.base.as_secs().saturating_mul(1u64 << (attempt - 1));
        Some(Duration::from_secs(secs).min(self.cap))
    }
}

/// A single managed connection to one broker account.
pub struct Session<A: BrokerAdapter> {
    adapter: A,
    state: SessionState,
    health: HealthPolicy,
    backoff: BackoffPolicy,
    consecutive_misses: u32,
    reconnect_attempts: u32,
}

impl<A: BrokerAdapter> Session<A> {
    pub fn new(adapter: A) -> Self {
        Self::with_policies(adapter, HealthPolicy::default(), BackoffPolicy::default())
    }

    pub fn with_policies(adapter: A, health: HealthPolicy, backoff: BackoffPolicy) -> Self {
        Self {
            adapter,
            state: SessionState::Disconnected,
            health,
            backoff,
            consecutive_misses: 0,
            reconnect_attempts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Attempt to connect. On success the session becomes `Healthy` and the
    /// reconnect-attempt counter resets; on failure it stays `Disconnected`
    /// and the attempt counter advances so the caller can compute the next
    /// backoff delay via [`Session::next_reconnect_delay`].
    pub async fn connect(&mut self) -> bool {
        self.state = SessionState::Connecting;
        match self.adapter.connect().await {
            Ok(()) => {
                info!("broker session connected");
                self.state = SessionState::Healthy;
                self.consecutive_misses = 0;
                self.reconnect_attempts = 0;
                true
            }
            Err(err) => {
                warn!(error = %err, "broker session connect failed");
                self.state = SessionState::Disconnected;
                self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
                false
            }
        }
    }

    /// Record the outcome of one heartbeat probe, applying the health
    /// policy's miss thresholds to drive the state transition.
    pub fn record_heartbeat(&mut self, ok: bool) {
        if ok {
            self.consecutive_misses = 0;
            if self.state == SessionState::Degraded {
                self.state = SessionState::Healthy;
            }
            return;
        }

        self.consecutive_misses = self.consecutive_misses.saturating_add(1);

        if self.consecutive_misses >= self.health.disconnect_after_misses {
            warn!(misses = self.consecutive_misses, "broker session disconnected on heartbeat misses");
            self.state = SessionState::Disconnected;
        } else if self.consecutive_misses >= self.health.degrade_after_misses {
            warn!(misses = self.consecutive_misses, "broker session degraded on heartbeat misses");
            self.state = SessionState::Degraded;
        }
    }

    /// An explicit broker error (as opposed to a missed heartbeat) always
    /// disconnects immediately.
    pub fn force_disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.consecutive_misses = 0;
    }

    /// Delay before the next reconnect attempt, or `None` if the backoff
    /// budget is exhausted and the session should stay `Disconnected`
    /// pending admin action (`broker.unreachable`).
    pub fn next_reconnect_delay(&self) -> Option<Duration> {
        self.backoff.delay_for_attempt(self.reconnect_attempts + 1)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn reconnect_exhausted(&self) -> bool {
        self.reconnect_attempts >= self.backoff.max_attempts
    }
}
