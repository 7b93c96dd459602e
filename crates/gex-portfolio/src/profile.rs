//! Per-profile runtime state: the snapshot RiskSizer and SignalGate read.
//!
//! `ProfileState` wraps the fill-driven `PortfolioState` ledger with the
//! ambient fields a tenant binding needs: trading-enabled flag, connection
//! health, peak-equity watermark (for drawdown), rolling pairwise
//! correlations, per-producer rate windows, and the idempotency cache for
//! `(profile_id, signal_id)` admission. Readers take an owned snapshot via
//! `clone()`; mutation happens only on the profile's single worker.

use std::collections::BTreeMap;

use crate::metrics::compute_equity_micros;
use crate::types::PortfolioState;
use crate::MarkMap;

/// Token-bucket rate limiter for one (profile, producer) pair.
#[derive(Clone, Debug, PartialEq)]
pub struct RateWindow {
    pub capacity: u32,
    pub tokens: f64,
    pub refill_per_minute: u32,
    pub last_refill_ms: i64,
}

impl RateWindow {
    pub fn new(capacity: u32, refill_per_minute: u32, now_ms: i64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_per_minute,
            last_refill_ms: now_ms,
        }
    }

    fn refill(&mut self, now_ms: i64) {
        if now_ms <= self.last_refill_ms {
            return;
        }
        let elapsed_ms = (now_ms - self.last_refill_ms) as f64;
        let refilled = elapsed_ms / 60_000.0 * self.refill_per_minute as f64;
        self.tokens = (self.tokens + refilled).min(self.capacity as f64);
        self.last_refill_ms = now_ms;
    }

    /// Attempt to take one token at `now_ms`. Returns true if a token was
    /// available and consumed.
    pub fn try_take(&mut self, now_ms: i64) -> bool {
        self.refill(now_ms);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Cached outcome of a previously-admitted `(profile_id, signal_id)` pair,
/// retained for the 24h idempotency window (spec §4.1 check 1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeenSignal {
    pub chain_id: uuid::Uuid,
    pub accepted: bool,
    pub seen_at_ms: i64,
}

pub const IDEMPOTENCY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// A tenant's full runtime state: ledger, health, rate limits, idempotency.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileState {
    pub profile_id: String,
    pub trading_enabled: bool,
    pub connection_healthy: bool,
    pub max_positions: u32,
    pub portfolio: PortfolioState,
    pub marks: MarkMap,
    /// Highest equity ever observed; drawdown is measured from this watermark.
    pub peak_equity_micros: i64,
    /// Symmetric pairwise correlation, keyed by sorted `(symbol_a, symbol_b)`.
    pub correlations: BTreeMap<(String, String), f64>,
    /// Keyed by producer identity (`Signal.source`).
    pub rate_windows: BTreeMap<String, RateWindow>,
    /// Keyed by `signal_id`.
    pub seen_signals: BTreeMap<String, SeenSignal>,
}

impl ProfileState {
    pub fn new(profile_id: impl Into<String>, initial_cash_micros: i64, max_positions: u32) -> Self {
        Self {
            profile_id: profile_id.into(),
            trading_enabled: true,
            connection_healthy: true,
            max_positions,
            portfolio: PortfolioState::new(initial_cash_micros),
            marks: MarkMap::new(),
            peak_equity_micros: initial_cash_micros,
            correlations: BTreeMap::new(),
            rate_windows: BTreeMap::new(),
            seen_signals: BTreeMap::new(),
        }
    }

    pub fn equity_micros(&self) -> i64 {
        compute_equity_micros(
            self.portfolio.cash_micros,
            &self.portfolio.positions,
            &self.marks,
        )
    }

    /// Refreshes the peak-equity watermark; call after every mark/fill update.
    pub fn update_peak_equity(&mut self) {
        let equity = self.equity_micros();
        if equity > self.peak_equity_micros {
            self.peak_equity_micros = equity;
        }
    }

    /// Fraction drawn down from the peak, in `[0, 1]`. Zero if at or above peak.
    pub fn drawdown_fraction(&self) -> f64 {
        if self.peak_equity_micros <= 0 {
            return 0.0;
        }
        let equity = self.equity_micros();
        let dd = (self.peak_equity_micros - equity) as f64 / self.peak_equity_micros as f64;
        dd.max(0.0)
    }

    pub fn open_position_count(&self) -> u32 {
        self.portfolio
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .count() as u32
    }

    fn correlation_key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn set_correlation(&mut self, symbol_a: &str, symbol_b: &str, rho: f64) {
        self.correlations
            .insert(Self::correlation_key(symbol_a, symbol_b), rho);
    }

    pub fn correlation_with(&self, symbol_a: &str, symbol_b: &str) -> Option<f64> {
        self.correlations
            .get(&Self::correlation_key(symbol_a, symbol_b))
            .copied()
    }

    /// Returns `(chain_id, accepted)` if `signal_id` was seen within the
    /// idempotency window as of `now_ms`; expired entries are treated as unseen.
    pub fn check_idempotent(&self, signal_id: &str, now_ms: i64) -> Option<(uuid::Uuid, bool)> {
        self.seen_signals.get(signal_id).and_then(|seen| {
            if now_ms - seen.seen_at_ms <= IDEMPOTENCY_WINDOW_MS {
                Some((seen.chain_id, seen.accepted))
            } else {
                None
            }
        })
    }

    pub fn record_signal(&mut self, signal_id: &str, chain_id: uuid::Uuid, accepted: bool, now_ms: i64) {
        self.seen_signals.insert(
            signal_id.to_string(),
            SeenSignal {
                chain_id,
                accepted,
                seen_at_ms: now_ms,
            },
        );
    }

    /// Evicts idempotency entries older than the 24h window. Call
    /// periodically; admission itself treats stale entries as unseen
    /// regardless so correctness never depends on eviction cadence.
    pub fn evict_expired_signals(&mut self, now_ms: i64) {
        self.seen_signals
            .retain(|_, seen| now_ms - seen.seen_at_ms <= IDEMPOTENCY_WINDOW_MS);
    }

    pub fn rate_window_for(
        &mut self,
        producer: &str,
        capacity: u32,
        refill_per_minute: u32,
        now_ms: i64,
    ) -> &mut RateWindow {
        self.rate_windows
            .entry(producer.to_string())
            .or_insert_with(|| RateWindow::new(capacity, refill_per_minute, now_ms))
    }
}
