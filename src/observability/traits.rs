use crate::health::CheckStatus;
use crate::report::{RunState, StepOutcome};
use std::time::Duration;

/// Events the observer can record
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    RunStart {
        run_id: String,
        plan: String,
        steps: usize,
    },
    /// One attempt of a step or health check failed. `retry_in` is `None`
    /// when no further attempt follows.
    StepAttemptFailed {
        subject: String,
        attempt: u32,
        error: String,
        retry_in: Option<Duration>,
    },
    StepEnd {
        step: String,
        outcome: StepOutcome,
        attempts: u32,
        duration: Duration,
    },
    CheckEnd {
        check: String,
        status: CheckStatus,
        required: bool,
        attempts: u32,
        duration: Duration,
    },
    RollbackStart {
        reason: String,
        steps: usize,
    },
    RunEnd {
        run_id: String,
        state: RunState,
        duration: Duration,
    },
}

/// Core observability trait: implement for any backend
pub trait Observer: Send + Sync {
    /// Record a discrete event
    fn record_event(&self, event: &ObserverEvent);

    /// Flush any buffered data (no-op for most backends)
    fn flush(&self) {}

    /// Human-readable name of this observer
    fn name(&self) -> &str;
}
