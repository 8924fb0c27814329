use crate::plan::RetryPolicy;
use crate::report::duration_ms;
use crate::resource::{PortForwardSpec, ResourceRef};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum CheckStatus {
    Passed,
    Failed,
    TimedOut,
    SkippedDueToDependency,
    Cancelled,
}

impl CheckStatus {
    pub fn is_passed(self) -> bool {
        self == Self::Passed
    }
}

/// Read-only verification performed by a health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthProbe {
    /// Local binary answers, e.g. `kubectl version --client`.
    ToolAvailable { program: String, args: Vec<String> },
    /// The control plane answers a read of this namespace.
    ClusterReachable { namespace: String },
    ResourceReady { target: ResourceRef },
    Http {
        url: String,
        expected_status: u16,
        #[serde(default)]
        body_contains: Option<String>,
    },
    ForwardedHttp {
        forward: PortForwardSpec,
        path: String,
        expected_status: u16,
        #[serde(default)]
        body_contains: Option<String>,
    },
    LogContains {
        source: ResourceRef,
        pattern: String,
        since_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheck {
    pub id: String,
    pub label: String,
    /// Checks that must pass before this one runs.
    pub depends_on: Vec<String>,
    pub probe: HealthProbe,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    /// Presentational only: picks the log level and the report symbol. Any
    /// non-passing check degrades the run whether or not it is required.
    pub required: bool,
}

impl HealthCheck {
    pub fn new(id: impl Into<String>, label: impl Into<String>, probe: HealthProbe) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            depends_on: Vec::new(),
            probe,
            retry: RetryPolicy::none(),
            timeout: DEFAULT_CHECK_TIMEOUT,
            required: true,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn informational(self) -> Self {
        self.required(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthOutcome {
    pub id: String,
    pub label: String,
    pub required: bool,
    pub status: CheckStatus,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthOutcome {
    pub fn skipped(check: &HealthCheck, reason: impl Into<String>) -> Self {
        Self {
            id: check.id.clone(),
            label: check.label.clone(),
            required: check.required,
            status: CheckStatus::SkippedDueToDependency,
            duration: Duration::ZERO,
            attempts: 0,
            output: String::new(),
            error: Some(reason.into()),
        }
    }
}
