use super::types::{Precondition, StepAction};
use crate::error::{ResourceError, StepError};
use crate::resource::{
    ApplyChange, BoxFuture, DeleteOutcome, ResourceClient, local_url, with_port_forward,
};
use std::sync::Arc;
use std::time::Duration;

const MAX_STDERR_EXCERPT: usize = 400;

/// What one successful attempt produced. `change` is set only by `apply`
/// actions and decides whether a rollback owns the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    pub summary: String,
    pub change: Option<ApplyChange>,
}

impl ActionOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            change: None,
        }
    }

    pub fn applied(summary: impl Into<String>, change: ApplyChange) -> Self {
        Self {
            summary: summary.into(),
            change: Some(change),
        }
    }
}

/// Executes step actions and preconditions. The executor owns timeouts and
/// retries; a runner performs exactly one attempt per call.
pub trait StepRunner: Send + Sync {
    fn check_precondition<'a>(
        &'a self,
        precondition: &'a Precondition,
    ) -> BoxFuture<'a, Result<bool, StepError>>;

    fn run_action<'a>(
        &'a self,
        action: &'a StepAction,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ActionOutput, StepError>>;
}

/// Maps step actions onto `ResourceClient` calls.
pub struct ResourceStepRunner {
    client: Arc<dyn ResourceClient>,
}

impl ResourceStepRunner {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    async fn exists(&self, target: &crate::resource::ResourceRef) -> Result<bool, StepError> {
        match self.client.get(target).await {
            Ok(_) => Ok(true),
            Err(ResourceError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn act(&self, action: &StepAction, timeout: Duration) -> Result<ActionOutput, StepError> {
        let summary = match action {
            StepAction::Apply { manifest } => {
                let applied = self.client.apply(manifest).await?;
                return Ok(ActionOutput::applied(
                    format!("{} {}", applied.target, applied.change),
                    applied.change,
                ));
            }
            StepAction::Delete { target } => match self.client.delete(target).await? {
                DeleteOutcome::Deleted => format!("{target} deleted"),
                DeleteOutcome::AlreadyAbsent => format!("{target} already absent"),
            },
            StepAction::WaitReady { target } => {
                self.client.wait_until_ready(target, timeout).await?;
                format!("{target} ready")
            }
            StepAction::Exec { target, command } => {
                let output = self.client.exec(target, command).await?;
                if !output.success() {
                    return Err(StepError::OperationFailed(format!(
                        "`{}` exited with {}: {}",
                        command.join(" "),
                        output.exit_code,
                        stderr_excerpt(&output.stderr)
                    )));
                }
                output.stdout.trim().to_string()
            }
            StepAction::HttpProbe {
                url,
                expected_status,
            } => {
                let response = self.client.http_probe(url, *expected_status, timeout).await?;
                format!("{url} -> {}", response.status)
            }
            StepAction::ForwardedProbe {
                forward,
                path,
                expected_status,
            } => {
                let client = self.client.as_ref();
                let status = with_port_forward(client, forward, |port| async move {
                    let url = local_url(port, path);
                    client
                        .http_probe(&url, *expected_status, timeout)
                        .await
                        .map(|response| response.status)
                })
                .await?;
                format!("svc/{}{path} -> {status}", forward.service)
            }
            StepAction::Checkpoint { label } => format!("[checkpoint] {label}"),
        };
        Ok(ActionOutput::new(summary))
    }
}

impl StepRunner for ResourceStepRunner {
    fn check_precondition<'a>(
        &'a self,
        precondition: &'a Precondition,
    ) -> BoxFuture<'a, Result<bool, StepError>> {
        Box::pin(async move {
            match precondition {
                Precondition::ResourceExists { target } => self.exists(target).await,
                Precondition::ResourceAbsent { target } => self.exists(target).await.map(|found| !found),
                Precondition::CommandSucceeds { target, command } => {
                    let output = self.client.exec(target, command).await?;
                    Ok(output.success())
                }
            }
        })
    }

    fn run_action<'a>(
        &'a self,
        action: &'a StepAction,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ActionOutput, StepError>> {
        Box::pin(self.act(action, timeout))
    }
}

fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return "no stderr".to_string();
    }
    if trimmed.len() <= MAX_STDERR_EXCERPT {
        return trimmed.to_string();
    }
    format!("{}…", &trimmed[..trimmed.floor_char_boundary(MAX_STDERR_EXCERPT)])
}
