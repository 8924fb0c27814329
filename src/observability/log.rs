use super::traits::{Observer, ObserverEvent};
use tracing::{info, warn};

/// Log-based observer: uses tracing, zero external deps
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::RunStart {
                run_id,
                plan,
                steps,
            } => {
                info!(run_id = %run_id, plan = %plan, steps = steps, "run.start");
            }
            ObserverEvent::StepAttemptFailed {
                subject,
                attempt,
                error,
                retry_in,
            } => match retry_in {
                Some(delay) => warn!(
                    subject = %subject,
                    attempt = attempt,
                    retry_in_ms = millis(*delay),
                    error = %error,
                    "attempt.failed"
                ),
                None => warn!(subject = %subject, attempt = attempt, error = %error, "attempt.failed"),
            },
            ObserverEvent::StepEnd {
                step,
                outcome,
                attempts,
                duration,
            } => {
                info!(
                    step = %step,
                    outcome = %outcome,
                    attempts = attempts,
                    duration_ms = millis(*duration),
                    "step.end"
                );
            }
            ObserverEvent::CheckEnd {
                check,
                status,
                required,
                attempts,
                duration,
            } => {
                if status.is_passed() {
                    info!(
                        check = %check,
                        status = %status,
                        required = required,
                        attempts = attempts,
                        duration_ms = millis(*duration),
                        "check.end"
                    );
                } else {
                    warn!(
                        check = %check,
                        status = %status,
                        required = required,
                        attempts = attempts,
                        duration_ms = millis(*duration),
                        "check.end"
                    );
                }
            }
            ObserverEvent::RollbackStart { reason, steps } => {
                warn!(reason = %reason, steps = steps, "rollback.start");
            }
            ObserverEvent::RunEnd {
                run_id,
                state,
                duration,
            } => {
                info!(run_id = %run_id, state = %state, duration_ms = millis(*duration), "run.end");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
