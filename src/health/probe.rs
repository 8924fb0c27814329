use super::types::HealthProbe;
use crate::error::{ResourceError, StepError};
use crate::resource::{
    BoxFuture, ExecTarget, ProbeResponse, ResourceClient, ResourceKind, ResourceRef, local_url,
    readiness, with_port_forward,
};
use std::sync::Arc;
use std::time::Duration;

/// One attempt of a health probe. Retries live in the suite.
pub trait ProbeRunner: Send + Sync {
    fn probe<'a>(
        &'a self,
        probe: &'a HealthProbe,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<String, StepError>>;
}

pub struct ResourceProbeRunner {
    client: Arc<dyn ResourceClient>,
}

impl ResourceProbeRunner {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    async fn run(&self, probe: &HealthProbe, timeout: Duration) -> Result<String, StepError> {
        match probe {
            HealthProbe::ToolAvailable { program, args } => {
                let command = std::iter::once(program.clone())
                    .chain(args.iter().cloned())
                    .collect::<Vec<_>>();
                let output = self.client.exec(&ExecTarget::Local, &command).await?;
                if !output.success() {
                    return Err(StepError::OperationFailed(format!(
                        "`{}` exited with {}",
                        command.join(" "),
                        output.exit_code
                    )));
                }
                Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
            }
            HealthProbe::ClusterReachable { namespace } => {
                let target = ResourceRef::new(ResourceKind::Namespace, namespace.clone());
                match self.client.get(&target).await {
                    Ok(_) => Ok(format!("control plane answered for {target}")),
                    // The API answered, the namespace just isn't there.
                    Err(ResourceError::NotFound { .. }) => Ok("control plane answered".to_string()),
                    Err(e) => Err(e.into()),
                }
            }
            HealthProbe::ResourceReady { target } => {
                let resource = self.client.get(target).await?;
                if readiness::is_ready(&resource) {
                    Ok(format!("{target} ready"))
                } else {
                    Err(StepError::OperationFailed(format!("{target} not ready")))
                }
            }
            HealthProbe::Http {
                url,
                expected_status,
                body_contains,
            } => {
                let response = self.client.http_probe(url, *expected_status, timeout).await?;
                expect_body(url, &response, body_contains.as_deref())
            }
            HealthProbe::ForwardedHttp {
                forward,
                path,
                expected_status,
                body_contains,
            } => {
                let client = self.client.as_ref();
                let (url, response) = with_port_forward(client, forward, |port| async move {
                    let url = local_url(port, path);
                    let response = client.http_probe(&url, *expected_status, timeout).await?;
                    Ok((url, response))
                })
                .await?;
                expect_body(&url, &response, body_contains.as_deref())
            }
            HealthProbe::LogContains {
                source,
                pattern,
                since_secs,
            } => {
                let logs = self
                    .client
                    .logs(source, Duration::from_secs(*since_secs))
                    .await?;
                let hits = logs.lines().filter(|line| line.contains(pattern.as_str())).count();
                if hits == 0 {
                    return Err(StepError::OperationFailed(format!(
                        "no '{pattern}' in logs of {source} over the last {since_secs}s"
                    )));
                }
                Ok(format!("{hits} matching log lines"))
            }
        }
    }
}

impl ProbeRunner for ResourceProbeRunner {
    fn probe<'a>(
        &'a self,
        probe: &'a HealthProbe,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<String, StepError>> {
        Box::pin(self.run(probe, timeout))
    }
}

fn expect_body(url: &str, response: &ProbeResponse, needle: Option<&str>) -> Result<String, StepError> {
    match needle {
        Some(needle) if !response.body.contains(needle) => Err(StepError::OperationFailed(format!(
            "{url} answered {} without '{needle}'",
            response.status
        ))),
        _ => Ok(format!("{url} -> {}", response.status)),
    }
}
