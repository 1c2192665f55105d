//! Retry orchestration: score, analyze, fix, persist, rescore, journal.

mod batch;
mod error;
mod gate;

#[cfg(test)]
mod testing;

pub use batch::{BatchSummary, FailureCause, FailureReport, StopSignal, run_batch};
pub use error::GateError;
pub use gate::{AttemptRecord, Gate, GateOutcome, GateStatus};
