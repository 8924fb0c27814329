use super::graph::DependencyGraph;
use super::probe::ProbeRunner;
use super::types::{CheckStatus, HealthCheck, HealthOutcome};
use crate::error::StepError;
use crate::observability::{Observer, ObserverEvent};
use crate::plan::{Validator, retry_with_backoff};
use crate::resource::BoxFuture;
use anyhow::Result;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dependency-ordered set of health checks.
///
/// Checks whose dependencies have all passed run concurrently (up to the
/// parallelism cap). A check whose dependency did not pass is never probed;
/// it and everything downstream of it is recorded as skipped.
pub struct HealthCheckSuite {
    checks: Vec<HealthCheck>,
    graph: DependencyGraph,
    probes: Arc<dyn ProbeRunner>,
    observer: Arc<dyn Observer>,
    parallelism: usize,
}

impl HealthCheckSuite {
    pub fn new(
        checks: Vec<HealthCheck>,
        probes: Arc<dyn ProbeRunner>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        let graph = DependencyGraph::build(&checks)?;
        Ok(Self {
            checks,
            graph,
            probes,
            observer,
            parallelism: 0,
        })
    }

    /// 0 means unbounded.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn checks(&self) -> &[HealthCheck] {
        &self.checks
    }

    pub fn execution_order(&self) -> Vec<&str> {
        self.graph.topological_order()
    }

    /// Run every check once; outcomes come back in declared order.
    pub async fn run(&self, cancel: &CancellationToken) -> Vec<HealthOutcome> {
        let total = self.checks.len();
        let limit = if self.parallelism == 0 {
            total.max(1)
        } else {
            self.parallelism
        };

        let mut outcomes: Vec<Option<HealthOutcome>> = vec![None; total];
        let mut pending = (0..total)
            .map(|index| self.graph.dependencies(index).len())
            .collect::<Vec<_>>();
        let mut ready = (0..total)
            .filter(|index| pending[*index] == 0)
            .collect::<VecDeque<_>>();
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < limit {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                running.push(self.run_check(index, cancel));
            }

            let Some((index, outcome)) = running.next().await else {
                break;
            };

            let passed = outcome.status.is_passed();
            let status = outcome.status;
            self.finish(&mut outcomes, index, outcome);

            if passed {
                for &dependent in self.graph.dependents(index) {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 && outcomes[dependent].is_none() {
                        ready.push_back(dependent);
                    }
                }
            } else {
                self.skip_downstream(&mut outcomes, index, status);
            }
        }

        outcomes
            .into_iter()
            .zip(&self.checks)
            .map(|(outcome, check)| {
                outcome.unwrap_or_else(|| HealthOutcome::skipped(check, "never scheduled"))
            })
            .collect()
    }

    async fn run_check(&self, index: usize, cancel: &CancellationToken) -> (usize, HealthOutcome) {
        let check = &self.checks[index];
        let probes = &self.probes;
        let retried = retry_with_backoff(
            &check.retry,
            check.timeout,
            cancel,
            self.observer.as_ref(),
            &check.id,
            |_| probes.probe(&check.probe, check.timeout),
        )
        .await;

        let (status, output, error) = match retried.result {
            Ok(output) => (CheckStatus::Passed, output, None),
            Err(StepError::Cancelled) => (
                CheckStatus::Cancelled,
                String::new(),
                Some(StepError::Cancelled.to_string()),
            ),
            Err(e) if e.is_timeout() => (CheckStatus::TimedOut, String::new(), Some(e.to_string())),
            Err(e) => (CheckStatus::Failed, String::new(), Some(e.to_string())),
        };

        if !check.required && !status.is_passed() {
            tracing::warn!(check = %check.id, "informational check did not pass");
        }

        (
            index,
            HealthOutcome {
                id: check.id.clone(),
                label: check.label.clone(),
                required: check.required,
                status,
                duration: retried.elapsed,
                attempts: retried.attempts,
                output,
                error,
            },
        )
    }

    fn finish(&self, outcomes: &mut [Option<HealthOutcome>], index: usize, outcome: HealthOutcome) {
        self.observer.record_event(&ObserverEvent::CheckEnd {
            check: outcome.id.clone(),
            status: outcome.status,
            required: outcome.required,
            attempts: outcome.attempts,
            duration: outcome.duration,
        });
        outcomes[index] = Some(outcome);
    }

    fn skip_downstream(
        &self,
        outcomes: &mut [Option<HealthOutcome>],
        root: usize,
        status: CheckStatus,
    ) {
        let mut queue = VecDeque::from([(root, status)]);
        while let Some((current, current_status)) = queue.pop_front() {
            for &dependent in self.graph.dependents(current) {
                if outcomes[dependent].is_some() {
                    continue;
                }
                let reason = StepError::DependencyUnmet(format!(
                    "{} {current_status}",
                    self.checks[current].id
                ));
                let outcome = HealthOutcome::skipped(&self.checks[dependent], reason.to_string());
                self.finish(outcomes, dependent, outcome);
                queue.push_back((dependent, CheckStatus::SkippedDueToDependency));
            }
        }
    }
}

impl Validator for HealthCheckSuite {
    fn validate<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Vec<HealthOutcome>> {
        Box::pin(self.run(cancel))
    }
}
