use std::time::Duration;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `otel-rollout`.
///
/// Each layer defines its own error variant. Library callers can match on
/// these to decide recovery strategy; plan construction and command dispatch
/// continue to use `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum RolloutError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Cluster / compose resources ─────────────────────────────────────
    #[error("resource: {0}")]
    Resource(#[from] ResourceError),

    // ── Step execution ──────────────────────────────────────────────────
    #[error("step: {0}")]
    Step(#[from] StepError),

    // ── Run report ──────────────────────────────────────────────────────
    #[error("report: {0}")]
    Report(#[from] ReportError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Resource errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{target} not found")]
    NotFound { target: String },

    #[error("apply {target} failed: {details}")]
    Apply { target: String, details: String },

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// `status` is the HTTP status when a response arrived, `None` for
    /// timeouts and connection errors.
    #[error("probe {url} failed: {message}")]
    Probe {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("unexpected output from {program}: {message}")]
    Parse { program: String, message: String },

    #[error("port-forward to {service} failed: {message}")]
    PortForward { service: String, message: String },
}

impl ResourceError {
    /// Client-side rejections that will not resolve by retrying.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Apply { details, .. } => {
                let lower = details.to_ascii_lowercase();
                lower.contains("invalid")
                    || lower.contains("forbidden")
                    || lower.contains("unknown field")
                    || lower.contains("is not a valid chart")
            }
            Self::Probe { status, .. } => matches!(
                status,
                Some(code) if (400..500).contains(code) && *code != 408 && *code != 429
            ),
            Self::NotFound { .. }
            | Self::Timeout { .. }
            | Self::Command { .. }
            | Self::Parse { .. }
            | Self::PortForward { .. } => false,
        }
    }
}

// ─── Step errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StepError {
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("timed out after {}s", after.as_secs())]
    Timeout { after: Duration },

    #[error("dependency unmet: {0}")]
    DependencyUnmet(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("fatal step {step} failed: {message}")]
    FatalStepFailure { step: String, message: String },

    #[error("cancelled")]
    Cancelled,
}

impl StepError {
    /// Whether another attempt may change the result.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed(_) | Self::Timeout { .. } => true,
            Self::Resource(err) => !err.is_permanent(),
            Self::PreconditionNotMet(_)
            | Self::DependencyUnmet(_)
            | Self::FatalStepFailure { .. }
            | Self::Cancelled => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Resource(ResourceError::Timeout { .. })
        )
    }
}

// ─── Report errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("duplicate result for {0}")]
    DuplicateEntry(String),

    #[error("failed to serialize report: {0}")]
    Serialize(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, RolloutError>;
