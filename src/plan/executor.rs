use super::retry::retry_with_backoff;
use super::runner::{ActionOutput, StepRunner};
use super::types::Step;
use crate::error::StepError;
use crate::observability::{Observer, ObserverEvent};
use crate::report::{StepOutcome, StepResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs a single step: precondition, bounded attempts, backoff, result.
pub struct StepExecutor {
    runner: Arc<dyn StepRunner>,
    observer: Arc<dyn Observer>,
}

impl StepExecutor {
    pub fn new(runner: Arc<dyn StepRunner>, observer: Arc<dyn Observer>) -> Self {
        Self { runner, observer }
    }

    pub async fn run(&self, step: &Step, cancel: &CancellationToken) -> StepResult {
        let result = self.execute(step, cancel).await;
        self.observer.record_event(&ObserverEvent::StepEnd {
            step: result.id.clone(),
            outcome: result.outcome,
            attempts: result.attempts,
            duration: result.duration,
        });
        result
    }

    async fn execute(&self, step: &Step, cancel: &CancellationToken) -> StepResult {
        if let Some(precondition) = &step.precondition {
            let started = tokio::time::Instant::now();
            let checked = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(StepError::Cancelled),
                res = tokio::time::timeout(step.timeout, self.runner.check_precondition(precondition)) => {
                    res.unwrap_or(Err(StepError::Timeout { after: step.timeout }))
                }
            };

            match checked {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(step = %step.id, "precondition false, skipping");
                    let mut result = StepResult::skipped(
                        step,
                        StepError::PreconditionNotMet(precondition.to_string()).to_string(),
                    );
                    result.duration = started.elapsed();
                    return result;
                }
                // A precondition that cannot be evaluated fails the step outright.
                Err(error) => {
                    let outcome = classify(&error);
                    return finished(step, outcome, 0, started.elapsed(), String::new(), Some(error));
                }
            }
        }

        let runner = &self.runner;
        let retried = retry_with_backoff(
            &step.retry,
            step.timeout,
            cancel,
            self.observer.as_ref(),
            &step.id,
            |_| runner.run_action(&step.action, step.timeout),
        )
        .await;

        match retried.result {
            Ok(ActionOutput { summary, change }) => StepResult {
                change,
                ..finished(
                    step,
                    StepOutcome::Succeeded,
                    retried.attempts,
                    retried.elapsed,
                    summary,
                    None,
                )
            },
            Err(error) => finished(
                step,
                classify(&error),
                retried.attempts,
                retried.elapsed,
                String::new(),
                Some(error),
            ),
        }
    }
}

fn classify(error: &StepError) -> StepOutcome {
    if matches!(error, StepError::Cancelled) {
        StepOutcome::Cancelled
    } else if error.is_timeout() {
        StepOutcome::TimedOut
    } else {
        StepOutcome::Failed
    }
}

fn finished(
    step: &Step,
    outcome: StepOutcome,
    attempts: u32,
    duration: Duration,
    output: String,
    error: Option<StepError>,
) -> StepResult {
    StepResult {
        id: step.id.clone(),
        label: step.label.clone(),
        failure: step.failure,
        outcome,
        duration,
        attempts,
        output,
        error: error.map(|e| e.to_string()),
        change: None,
    }
}
