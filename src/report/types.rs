use crate::error::ReportError;
use crate::health::{CheckStatus, HealthOutcome};
use crate::plan::{FailurePolicy, Step};
use crate::resource::ApplyChange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    Skipped,
    TimedOut,
    Cancelled,
}

impl StepOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut | Self::Cancelled)
    }
}

/// Outcome of one step execution. Written once into the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub label: String,
    pub failure: FailurePolicy,
    pub outcome: StepOutcome,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set by `apply` steps; only `created` targets are rolled back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ApplyChange>,
}

impl StepResult {
    /// Result for a step that never ran; `reason` lands in `output`.
    pub fn skipped(step: &Step, reason: impl Into<String>) -> Self {
        Self {
            id: step.id.clone(),
            label: step.label.clone(),
            failure: step.failure,
            outcome: StepOutcome::Skipped,
            duration: Duration::ZERO,
            attempts: 0,
            output: reason.into(),
            error: None,
            change: None,
        }
    }

    pub fn is_fatal_failure(&self) -> bool {
        self.failure == FailurePolicy::Fatal && self.outcome.is_failure()
    }

    pub fn is_soft_failure(&self) -> bool {
        self.failure == FailurePolicy::Soft && self.outcome.is_failure()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Fatal,
}

impl OverallStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Fatal => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// In-progress record of one run. Append-only: each step, check and
/// rollback entry has exactly one slot.
#[derive(Debug)]
pub struct RunReport {
    run_id: Uuid,
    plan_id: String,
    started_at: DateTime<Utc>,
    started: std::time::Instant,
    state: RunState,
    abort_reason: Option<String>,
    steps: Vec<StepResult>,
    checks: Vec<HealthOutcome>,
    rollback: Vec<StepResult>,
    seen: HashSet<String>,
}

impl RunReport {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            plan_id: plan_id.into(),
            started_at: Utc::now(),
            started: std::time::Instant::now(),
            state: RunState::Pending,
            abort_reason: None,
            steps: Vec::new(),
            checks: Vec::new(),
            rollback: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn start(&mut self) {
        if self.state == RunState::Pending {
            self.state = RunState::Running;
        }
    }

    pub fn complete(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Completed;
        }
    }

    /// Move to `Aborted`. The first reason wins.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if matches!(self.state, RunState::Pending | RunState::Running) {
            self.state = RunState::Aborted;
            self.abort_reason = Some(reason.into());
        }
    }

    fn claim(&mut self, key: String) -> Result<(), ReportError> {
        if self.seen.insert(key.clone()) {
            Ok(())
        } else {
            Err(ReportError::DuplicateEntry(key))
        }
    }

    pub fn record_step(&mut self, result: StepResult) -> Result<(), ReportError> {
        self.claim(format!("step:{}", result.id))?;
        self.steps.push(result);
        Ok(())
    }

    pub fn record_check(&mut self, outcome: HealthOutcome) -> Result<(), ReportError> {
        self.claim(format!("check:{}", outcome.id))?;
        self.checks.push(outcome);
        Ok(())
    }

    pub fn record_rollback(&mut self, result: StepResult) -> Result<(), ReportError> {
        self.claim(format!("rollback:{}", result.id))?;
        self.rollback.push(result);
        Ok(())
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn checks(&self) -> &[HealthOutcome] {
        &self.checks
    }

    pub fn finish(self) -> FinalReport {
        FinalReport {
            run_id: self.run_id,
            plan: self.plan_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration: self.started.elapsed(),
            state: self.state,
            abort_reason: self.abort_reason,
            steps: self.steps,
            checks: self.checks,
            rollback: self.rollback,
        }
    }
}

/// Immutable result of a finished run, handed to the formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: Uuid,
    pub plan: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub steps: Vec<StepResult>,
    pub checks: Vec<HealthOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<StepResult>,
}

impl FinalReport {
    pub fn status(&self) -> OverallStatus {
        if self.state == RunState::Aborted || self.steps.iter().any(StepResult::is_fatal_failure) {
            return OverallStatus::Fatal;
        }
        if self.steps.iter().any(StepResult::is_soft_failure)
            || self.checks.iter().any(|check| !check.status.is_passed())
        {
            return OverallStatus::Degraded;
        }
        OverallStatus::Healthy
    }

    pub fn exit_code(&self) -> u8 {
        self.status().exit_code()
    }

    /// Totals over steps and checks; rollback entries are reported separately.
    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for step in &self.steps {
            counts.total += 1;
            match step.outcome {
                StepOutcome::Succeeded => counts.passed += 1,
                StepOutcome::Skipped => counts.skipped += 1,
                StepOutcome::Failed | StepOutcome::TimedOut | StepOutcome::Cancelled => {
                    counts.failed += 1;
                }
            }
        }
        for check in &self.checks {
            counts.total += 1;
            match check.status {
                CheckStatus::Passed => counts.passed += 1,
                CheckStatus::SkippedDueToDependency => counts.skipped += 1,
                CheckStatus::Failed | CheckStatus::TimedOut | CheckStatus::Cancelled => {
                    counts.failed += 1;
                }
            }
        }
        counts
    }

    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn check(&self, id: &str) -> Option<&HealthOutcome> {
        self.checks.iter().find(|check| check.id == id)
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
