use super::retry::RetryPolicy;
use crate::resource::{ExecTarget, Manifest, PortForwardSpec, ResourceRef};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::time::Duration;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Whether a failing step aborts the run or is only recorded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    Fatal,
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Apply {
        manifest: Manifest,
    },
    Delete {
        target: ResourceRef,
    },
    WaitReady {
        target: ResourceRef,
    },
    Exec {
        target: ExecTarget,
        command: Vec<String>,
    },
    HttpProbe {
        url: String,
        expected_status: u16,
    },
    ForwardedProbe {
        forward: PortForwardSpec,
        path: String,
        expected_status: u16,
    },
    Checkpoint {
        label: String,
    },
}

impl StepAction {
    /// Resource an `apply` creates; rollback removes it again.
    pub fn applied_target(&self) -> Option<ResourceRef> {
        match self {
            Self::Apply { manifest } => Some(manifest.target()),
            _ => None,
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply { manifest } => write!(f, "apply {}", manifest.target()),
            Self::Delete { target } => write!(f, "delete {target}"),
            Self::WaitReady { target } => write!(f, "wait for {target}"),
            Self::Exec { target, command } => write!(f, "exec on {target}: {}", command.join(" ")),
            Self::HttpProbe {
                url,
                expected_status,
            } => write!(f, "GET {url} expecting {expected_status}"),
            Self::ForwardedProbe {
                forward,
                path,
                expected_status,
            } => write!(
                f,
                "GET svc/{}:{}{path} via port-forward expecting {expected_status}",
                forward.service, forward.remote_port
            ),
            Self::Checkpoint { label } => write!(f, "checkpoint {label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Precondition {
    ResourceExists { target: ResourceRef },
    ResourceAbsent { target: ResourceRef },
    CommandSucceeds { target: ExecTarget, command: Vec<String> },
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExists { target } => write!(f, "{target} exists"),
            Self::ResourceAbsent { target } => write!(f, "{target} is absent"),
            Self::CommandSucceeds { target, command } => {
                write!(f, "`{}` succeeds on {target}", command.join(" "))
            }
        }
    }
}

/// One unit of work in a plan. Immutable once the plan is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub label: String,
    pub action: StepAction,
    pub precondition: Option<Precondition>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub failure: FailurePolicy,
    /// Consecutive steps sharing a group label run concurrently.
    pub group: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, label: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            action,
            precondition: None,
            timeout: DEFAULT_STEP_TIMEOUT,
            retry: RetryPolicy::none(),
            failure: FailurePolicy::Fatal,
            group: None,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.failure = FailurePolicy::Fatal;
        self
    }

    pub fn soft(mut self) -> Self {
        self.failure = FailurePolicy::Soft;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.failure == FailurePolicy::Fatal
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(id: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Result<Self> {
        let mut step_ids = BTreeSet::new();
        for step in &steps {
            if step.id.trim().is_empty() {
                bail!("plan step id cannot be empty");
            }

            if !step_ids.insert(step.id.as_str()) {
                bail!("duplicate plan step id: {}", step.id);
            }

            if step.timeout.is_zero() {
                bail!("step {} has a zero timeout", step.id);
            }
        }

        let mut closed_groups = BTreeSet::new();
        let mut current: Option<&str> = None;
        for step in &steps {
            let group = step.group.as_deref();
            if group != current {
                if let Some(previous) = current {
                    closed_groups.insert(previous);
                }
                if let Some(label) = group
                    && closed_groups.contains(label)
                {
                    bail!(
                        "parallel group '{label}' is not contiguous (step {} appears after the group ended)",
                        step.id
                    );
                }
                current = group;
            }
        }

        Ok(Self {
            id: id.into(),
            description: description.into(),
            steps,
        })
    }

    /// Index ranges of the execution groups, in declared order. Unlabeled
    /// steps form singleton groups.
    pub fn groups(&self) -> Vec<Range<usize>> {
        let mut groups = Vec::new();
        let mut start = 0;
        while start < self.steps.len() {
            let mut end = start + 1;
            if let Some(label) = &self.steps[start].group {
                while end < self.steps.len() && self.steps[end].group.as_ref() == Some(label) {
                    end += 1;
                }
            }
            groups.push(start..end);
            start = end;
        }
        groups
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }
}
