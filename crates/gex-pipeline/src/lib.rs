//! Stage wiring for the whole gateway: SignalGate → RiskSizer → Executor,
//! one worker per profile, with backpressure and cancellation (spec §5).
//!
//! This crate owns orchestration only. Each stage's decision logic lives in
//! its own crate (`gex-gate`, `gex-risk`, the broker adapters); this crate's
//! job is ordering, concurrency, retries, and provenance — never re-deriving
//! a stage's own rules.

pub mod executor;
pub mod paper_sink;
pub mod pipeline;
pub mod worker;

pub use executor::{ExecutionOutcome, ExecutorSink, ExecutorSinkError};
pub use paper_sink::PaperExecutorSink;
pub use pipeline::{Pipeline, SubmitError};
pub use worker::{ProfileWorker, SignalOutcome, SIGNAL_TO_EXECUTION_BUDGET};
