//! Managed broker sessions: one healthy connection per active profile,
//! reconnect/backoff mechanics, and fair-queued leasing.
//!
//! This crate owns the *pool*-level `BrokerAdapter` contract — connect,
//! disconnect, heartbeat, submit/close/list, tick subscription — which a
//! `Session` drives through its connection state machine. It is deliberately
//! a different, broader trait than gex-execution's order-router adapter:
//! that one only ever sees a session already leased healthy by this pool.

pub mod adapter;
pub mod pool;
pub mod session;

pub use adapter::{BrokerAdapter, BrokerAdapterError, ClosePositionRequest, SubmitOrderRequest};
pub use pool::{AcquireError, BrokerPool, PoolConfig, SessionLease};
pub use session::{BackoffPolicy, HealthPolicy, Session, SessionState};
