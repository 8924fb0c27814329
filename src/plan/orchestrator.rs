use super::executor::StepExecutor;
use super::types::{FailurePolicy, Plan, Step};
use crate::health::HealthOutcome;
use crate::observability::{Observer, ObserverEvent};
use crate::report::{FinalReport, RunReport, StepOutcome, StepResult};
use crate::resource::{ApplyChange, BoxFuture, DeleteOutcome, ResourceClient};
use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Best-effort undo invoked once when a run aborts on a fatal failure.
/// Failures are returned as results, never raised.
pub trait RollbackHook: Send + Sync {
    fn rollback<'a>(
        &'a self,
        plan: &'a Plan,
        completed: &'a [StepResult],
    ) -> BoxFuture<'a, Vec<StepResult>>;
}

/// Post-deploy gate run once after every group completed.
pub trait Validator: Send + Sync {
    fn validate<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Vec<HealthOutcome>>;
}

/// Deletes, newest first, whatever this run's `apply` steps created.
/// Targets that were already present (`unchanged` or `configured`) stay.
pub struct TeardownRollback {
    client: Arc<dyn ResourceClient>,
    timeout: Duration,
}

impl TeardownRollback {
    pub fn new(client: Arc<dyn ResourceClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn targets<'p>(plan: &'p Plan, completed: &[StepResult]) -> Vec<&'p Step> {
        completed
            .iter()
            .rev()
            .filter(|result| result.outcome == StepOutcome::Succeeded)
            .filter(|result| result.change == Some(ApplyChange::Created))
            .filter_map(|result| plan.step(&result.id))
            .filter(|step| step.action.applied_target().is_some())
            .collect()
    }
}

impl RollbackHook for TeardownRollback {
    fn rollback<'a>(
        &'a self,
        plan: &'a Plan,
        completed: &'a [StepResult],
    ) -> BoxFuture<'a, Vec<StepResult>> {
        Box::pin(async move {
            let mut results = Vec::new();
            for step in Self::targets(plan, completed) {
                let Some(target) = step.action.applied_target() else {
                    continue;
                };
                let started = tokio::time::Instant::now();
                let deleted = tokio::time::timeout(self.timeout, self.client.delete(&target)).await;
                let (outcome, output, error) = match deleted {
                    Ok(Ok(DeleteOutcome::Deleted)) => {
                        (StepOutcome::Succeeded, format!("{target} deleted"), None)
                    }
                    Ok(Ok(DeleteOutcome::AlreadyAbsent)) => {
                        (StepOutcome::Succeeded, format!("{target} already absent"), None)
                    }
                    Ok(Err(e)) => (StepOutcome::Failed, String::new(), Some(e.to_string())),
                    Err(_) => (
                        StepOutcome::TimedOut,
                        String::new(),
                        Some(format!("delete {target} timed out after {}s", self.timeout.as_secs())),
                    ),
                };
                if let Some(error) = &error {
                    tracing::warn!(step = %step.id, error = %error, "rollback step failed");
                }
                results.push(StepResult {
                    id: format!("rollback:{}", step.id),
                    label: format!("roll back {}", step.label),
                    failure: FailurePolicy::Soft,
                    outcome,
                    duration: started.elapsed(),
                    attempts: 1,
                    output,
                    error,
                    change: None,
                });
            }
            results
        })
    }
}

/// Drives a plan through `Pending -> Running -> {Completed, Aborted}`.
pub struct Orchestrator {
    executor: StepExecutor,
    observer: Arc<dyn Observer>,
    rollback: Option<Arc<dyn RollbackHook>>,
    validator: Option<Arc<dyn Validator>>,
    parallelism: usize,
    resume_from: Option<String>,
}

impl Orchestrator {
    pub fn new(executor: StepExecutor, observer: Arc<dyn Observer>) -> Self {
        Self {
            executor,
            observer,
            rollback: None,
            validator: None,
            parallelism: 0,
            resume_from: None,
        }
    }

    pub fn with_rollback(mut self, hook: Arc<dyn RollbackHook>) -> Self {
        self.rollback = Some(hook);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Cap on concurrent steps within a group; 0 means unbounded.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn resume_from(mut self, step_id: impl Into<String>) -> Self {
        self.resume_from = Some(step_id.into());
        self
    }

    pub async fn execute(&self, plan: &Plan, cancel: &CancellationToken) -> Result<FinalReport> {
        let start_index = match &self.resume_from {
            Some(id) => plan
                .position(id)
                .ok_or_else(|| anyhow!("cannot resume plan {}: unknown step '{id}'", plan.id))?,
            None => 0,
        };

        let mut report = RunReport::new(&plan.id);
        report.start();
        self.observer.record_event(&ObserverEvent::RunStart {
            run_id: report.run_id().to_string(),
            plan: plan.id.clone(),
            steps: plan.steps.len(),
        });

        let mut abort_reason: Option<String> = None;
        for range in plan.groups() {
            if abort_reason.is_none() && cancel.is_cancelled() {
                abort_reason = Some("run cancelled".to_string());
            }

            if let Some(reason) = &abort_reason {
                for step in &plan.steps[range] {
                    report.record_step(StepResult::skipped(step, format!("not run: {reason}")))?;
                }
                continue;
            }

            let split = start_index.clamp(range.start, range.end);
            for step in &plan.steps[range.start..split] {
                report.record_step(StepResult::skipped(step, "resumed past"))?;
            }

            let results = self.run_group(&plan.steps[split..range.end], cancel).await;
            for result in results {
                if abort_reason.is_none() && result.is_fatal_failure() {
                    abort_reason = Some(format!("fatal step {} {}", result.id, result.outcome));
                }
                report.record_step(result)?;
            }

            if abort_reason.is_none() && cancel.is_cancelled() {
                abort_reason = Some("run cancelled".to_string());
            }
        }

        if let Some(reason) = abort_reason {
            report.abort(reason.clone());
            if cancel.is_cancelled() {
                tracing::warn!(plan = %plan.id, "run cancelled; rollback not attempted");
            } else if let Some(hook) = &self.rollback {
                let applied = TeardownRollback::targets(plan, report.steps()).len();
                self.observer.record_event(&ObserverEvent::RollbackStart {
                    reason,
                    steps: applied,
                });
                for result in hook.rollback(plan, report.steps()).await {
                    report.record_rollback(result)?;
                }
            }
        } else {
            report.complete();
            if let Some(validator) = &self.validator {
                for outcome in validator.validate(cancel).await {
                    report.record_check(outcome)?;
                }
            }
        }

        self.observer.record_event(&ObserverEvent::RunEnd {
            run_id: report.run_id().to_string(),
            state: report.state(),
            duration: report.elapsed(),
        });
        self.observer.flush();
        Ok(report.finish())
    }

    /// Run one group to its barrier; results come back in plan order.
    async fn run_group(&self, steps: &[Step], cancel: &CancellationToken) -> Vec<StepResult> {
        match steps {
            [] => Vec::new(),
            [step] => vec![self.executor.run(step, cancel).await],
            _ => {
                let limit = match self.parallelism {
                    0 => steps.len(),
                    n => n.min(steps.len()),
                };
                let mut indexed = futures_util::stream::iter(steps.iter().enumerate())
                    .map(|(index, step)| async move { (index, self.executor.run(step, cancel).await) })
                    .buffer_unordered(limit)
                    .collect::<Vec<_>>()
                    .await;
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, result)| result).collect()
            }
        }
    }
}
