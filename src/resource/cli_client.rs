use super::http;
use super::port_forward::PortForwardSession;
use super::process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
use super::traits::{
    AppliedResource, ApplyChange, BoxFuture, DeleteOutcome, ExecOutput, ExecTarget, Manifest,
    ManifestSource, PortForwardSpec, ProbeResponse, Resource, ResourceClient, ResourceKind,
    ResourceRef,
};
use crate::config::ToolsConfig;
use crate::error::ResourceError;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};

/// How long `kubectl port-forward` may take to announce its listener.
const PORT_FORWARD_READY_SECS: u64 = 15;
/// Longest stderr excerpt carried into an error message.
const MAX_ERROR_CHARS: usize = 600;

/// `ResourceClient` backed by the `kubectl`, `helm` and `docker compose` CLIs.
pub struct CliResourceClient {
    tools: ToolsConfig,
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
}

impl CliResourceClient {
    pub fn new(tools: ToolsConfig) -> Self {
        Self::with_runner(tools, Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(tools: ToolsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            tools,
            runner,
            http: reqwest::Client::new(),
        }
    }

    fn kubectl(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.tools.kubectl);
        match &self.tools.kube_context {
            Some(context) => spec.args(["--context", context.as_str()]),
            None => spec,
        }
    }

    fn helm(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.tools.helm);
        match &self.tools.kube_context {
            Some(context) => spec.args(["--kube-context", context.as_str()]),
            None => spec,
        }
    }

    fn compose(&self) -> CommandSpec {
        CommandSpec::new(&self.tools.docker).arg("compose")
    }

    async fn get_resource(&self, target: &ResourceRef) -> Result<Resource, ResourceError> {
        let body = match target.kind {
            ResourceKind::HelmRelease => {
                let spec = self.helm().args([
                    "status",
                    target.name.as_str(),
                    "-n",
                    namespace_or_default(target),
                    "-o",
                    "json",
                ]);
                let output = self.runner.run(&spec).await?;
                if !output.success() {
                    return Err(classify_failure(target, &spec, &output));
                }
                parse_json(&spec, &output.stdout)?
            }
            ResourceKind::ComposeProject => {
                let spec = self.compose().args([
                    "-p",
                    target.name.as_str(),
                    "ps",
                    "--all",
                    "--format",
                    "json",
                ]);
                let output = self.runner.run(&spec).await?;
                if !output.success() {
                    return Err(classify_failure(target, &spec, &output));
                }
                let containers = parse_compose_ps(&spec, &output.stdout)?;
                if containers.is_empty() {
                    return Err(not_found(target));
                }
                Value::Array(containers)
            }
            kind => {
                let spec = self
                    .kubectl()
                    .args(["get", kubectl_kind(kind), target.name.as_str()])
                    .args(namespace_args(target))
                    .args(["-o", "json"]);
                let output = self.runner.run(&spec).await?;
                if !output.success() {
                    return Err(classify_failure(target, &spec, &output));
                }
                parse_json(&spec, &output.stdout)?
            }
        };

        Ok(Resource {
            reference: target.clone(),
            body,
        })
    }

    async fn apply_manifest(&self, manifest: &Manifest) -> Result<AppliedResource, ResourceError> {
        let target = manifest.target();
        let spec = match manifest {
            Manifest::Kubernetes { source, .. } => {
                let spec = self.kubectl().arg("apply").args(namespace_args(&target));
                match source {
                    ManifestSource::File(path) => {
                        spec.args(["-f".to_string(), path.to_string_lossy().into_owned()])
                    }
                    ManifestSource::Inline(body) => spec.args(["-f", "-"]).stdin(body.clone()),
                }
            }
            Manifest::HelmRelease {
                release,
                namespace,
                chart,
                version,
                values_files,
                set,
            } => {
                let mut spec = self.helm().args([
                    "upgrade",
                    "--install",
                    release.as_str(),
                    chart.as_str(),
                    "-n",
                    namespace.as_str(),
                    "--create-namespace",
                ]);
                if let Some(version) = version {
                    spec = spec.args(["--version", version.as_str()]);
                }
                for file in values_files {
                    spec = spec.args(["-f".to_string(), file.to_string_lossy().into_owned()]);
                }
                for (key, value) in set {
                    spec = spec.args(["--set".to_string(), format!("{key}={value}")]);
                }
                spec
            }
            Manifest::ComposeProject { project, file } => self.compose().args([
                "-f".to_string(),
                file.to_string_lossy().into_owned(),
                "-p".to_string(),
                project.clone(),
                "up".to_string(),
                "-d".to_string(),
                "--remove-orphans".to_string(),
            ]),
        };

        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(ResourceError::Apply {
                target: target.to_string(),
                details: failure_message(&output),
            });
        }

        let change = match manifest {
            Manifest::Kubernetes { .. } => parse_kubectl_apply(&output.stdout),
            Manifest::HelmRelease { .. } => parse_helm_revision(&output.stdout),
            Manifest::ComposeProject { .. } => {
                parse_compose_up(&format!("{}\n{}", output.stdout, output.stderr))
            }
        };

        tracing::debug!(target = %target, change = %change, "applied");
        Ok(AppliedResource {
            target,
            change,
            detail: first_line(&output.stdout).to_string(),
        })
    }

    async fn delete_resource(&self, target: &ResourceRef) -> Result<DeleteOutcome, ResourceError> {
        let spec = match target.kind {
            ResourceKind::HelmRelease | ResourceKind::ComposeProject => {
                match self.get_resource(target).await {
                    Err(ResourceError::NotFound { .. }) => return Ok(DeleteOutcome::AlreadyAbsent),
                    Err(e) => return Err(e),
                    Ok(_) => {}
                }
                if target.kind == ResourceKind::HelmRelease {
                    self.helm().args([
                        "uninstall",
                        target.name.as_str(),
                        "-n",
                        namespace_or_default(target),
                    ])
                } else {
                    self.compose()
                        .args(["-p", target.name.as_str(), "down", "--remove-orphans"])
                }
            }
            kind => self
                .kubectl()
                .args(["delete", kubectl_kind(kind), target.name.as_str()])
                .args(namespace_args(target))
                .arg("--ignore-not-found=true"),
        };

        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return match classify_failure(target, &spec, &output) {
                ResourceError::NotFound { .. } => Ok(DeleteOutcome::AlreadyAbsent),
                other => Err(other),
            };
        }

        // `kubectl delete --ignore-not-found` prints nothing for absent objects.
        if target.kind.kubectl_name().is_some() && output.stdout.trim().is_empty() {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        Ok(DeleteOutcome::Deleted)
    }

    fn exec_spec(&self, target: &ExecTarget, command: &[String]) -> Result<CommandSpec, ResourceError> {
        let Some((program, args)) = command.split_first() else {
            return Err(ResourceError::Command {
                program: String::new(),
                message: format!("empty command for {target}"),
            });
        };

        Ok(match target {
            ExecTarget::Local => CommandSpec::new(program).args(args.iter().cloned()),
            ExecTarget::Pod {
                namespace,
                name,
                container,
            } => {
                let mut spec = self
                    .kubectl()
                    .args(["exec", "-n", namespace.as_str(), name.as_str()]);
                if let Some(container) = container {
                    spec = spec.args(["-c", container.as_str()]);
                }
                spec.arg("--").arg(program).args(args.iter().cloned())
            }
            ExecTarget::ComposeService { project, service } => self
                .compose()
                .args(["-p", project.as_str(), "exec", "-T", service.as_str()])
                .arg(program)
                .args(args.iter().cloned()),
        })
    }

    async fn spawn_port_forward(&self, spec: &PortForwardSpec) -> Result<PortForwardSession, ResourceError> {
        let pf_error = |message: String| ResourceError::PortForward {
            service: spec.service.clone(),
            message,
        };

        let mut cmd = tokio::process::Command::new(&self.tools.kubectl);
        if let Some(context) = &self.tools.kube_context {
            cmd.args(["--context", context.as_str()]);
        }
        cmd.arg("port-forward")
            .arg(format!("svc/{}", spec.service))
            .arg(format!("{}:{}", spec.local_port, spec.remote_port))
            .args(["-n", spec.namespace.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| pf_error(format!("failed to spawn kubectl: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| pf_error("stdout not captured".to_string()))?;
        let mut lines = tokio::io::BufReader::new(stdout).lines();

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(PORT_FORWARD_READY_SECS);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                child.kill().await.ok();
                return Err(pf_error(format!(
                    "listener not announced within {PORT_FORWARD_READY_SECS}s"
                )));
            }

            match tokio::time::timeout(remaining, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    tracing::debug!("port-forward: {line}");
                    if line.contains("Forwarding from") {
                        break;
                    }
                }
                Ok(Ok(None) | Err(_)) => {
                    let mut stderr = String::new();
                    if let Some(mut pipe) = child.stderr.take() {
                        pipe.read_to_string(&mut stderr).await.ok();
                    }
                    child.wait().await.ok();
                    return Err(pf_error(excerpt(stderr.trim(), MAX_ERROR_CHARS)));
                }
                Err(_) => {}
            }
        }

        // kubectl logs every accepted connection and every broken one; keep
        // draining both pipes so it never blocks on a full buffer.
        let service = spec.service.clone();
        let stderr = child.stderr.take();
        tokio::spawn(async move {
            let errors = async {
                if let Some(pipe) = stderr {
                    drain_lines(tokio::io::BufReader::new(pipe).lines(), &service, "stderr").await;
                }
            };
            tokio::join!(drain_lines(lines, &service, "stdout"), errors);
        });

        tracing::debug!(service = %spec.service, local_port = spec.local_port, "port-forward open");
        Ok(PortForwardSession::spawned(
            spec.service.clone(),
            spec.local_port,
            child,
        ))
    }
}

/// Reads `lines` to EOF, tracing each one. Returns the number of lines seen.
async fn drain_lines<R>(mut lines: tokio::io::Lines<R>, service: &str, stream: &str) -> usize
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut seen = 0;
    while let Ok(Some(line)) = lines.next_line().await {
        seen += 1;
        tracing::trace!(service, stream, "port-forward: {line}");
    }
    seen
}

impl ResourceClient for CliResourceClient {
    fn name(&self) -> &str {
        "cli"
    }

    fn get<'a>(&'a self, target: &'a ResourceRef) -> BoxFuture<'a, Result<Resource, ResourceError>> {
        Box::pin(self.get_resource(target))
    }

    fn apply<'a>(
        &'a self,
        manifest: &'a Manifest,
    ) -> BoxFuture<'a, Result<AppliedResource, ResourceError>> {
        Box::pin(self.apply_manifest(manifest))
    }

    fn delete<'a>(
        &'a self,
        target: &'a ResourceRef,
    ) -> BoxFuture<'a, Result<DeleteOutcome, ResourceError>> {
        Box::pin(self.delete_resource(target))
    }

    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
    ) -> BoxFuture<'a, Result<ExecOutput, ResourceError>> {
        Box::pin(async move {
            let spec = self.exec_spec(target, command)?;
            let output = self.runner.run(&spec).await?;
            Ok(ExecOutput {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
            })
        })
    }

    fn logs<'a>(
        &'a self,
        source: &'a ResourceRef,
        since: Duration,
    ) -> BoxFuture<'a, Result<String, ResourceError>> {
        Box::pin(async move {
            let since_arg = format!("{}s", since.as_secs().max(1));
            let spec = match source.kind {
                ResourceKind::ComposeProject => self.compose().args([
                    "-p",
                    source.name.as_str(),
                    "logs",
                    "--no-color",
                    "--since",
                    since_arg.as_str(),
                ]),
                ResourceKind::HelmRelease => {
                    return Err(ResourceError::Command {
                        program: self.tools.helm.clone(),
                        message: format!("{source} has no log stream"),
                    });
                }
                kind => self
                    .kubectl()
                    .arg("logs")
                    .arg(format!("{}/{}", kubectl_kind(kind), source.name))
                    .args(namespace_args(source))
                    .arg(format!("--since={since_arg}"))
                    .arg("--all-containers=true"),
            };

            let output = self.runner.run(&spec).await?;
            if !output.success() {
                return Err(classify_failure(source, &spec, &output));
            }
            Ok(output.stdout)
        })
    }

    fn port_forward<'a>(
        &'a self,
        spec: &'a PortForwardSpec,
    ) -> BoxFuture<'a, Result<PortForwardSession, ResourceError>> {
        Box::pin(self.spawn_port_forward(spec))
    }

    fn http_probe<'a>(
        &'a self,
        url: &'a str,
        expected_status: u16,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ProbeResponse, ResourceError>> {
        Box::pin(http::http_probe(&self.http, url, expected_status, timeout))
    }
}

fn kubectl_kind(kind: ResourceKind) -> &'static str {
    kind.kubectl_name().unwrap_or("all")
}

fn namespace_or_default(target: &ResourceRef) -> &str {
    target.namespace.as_deref().unwrap_or("default")
}

fn namespace_args(target: &ResourceRef) -> Vec<String> {
    match &target.namespace {
        Some(ns) if !target.kind.is_cluster_scoped() => vec!["-n".to_string(), ns.clone()],
        _ => Vec::new(),
    }
}

fn not_found(target: &ResourceRef) -> ResourceError {
    ResourceError::NotFound {
        target: target.to_string(),
    }
}

fn classify_failure(target: &ResourceRef, spec: &CommandSpec, output: &CommandOutput) -> ResourceError {
    let lower = output.stderr.to_ascii_lowercase();
    if lower.contains("notfound") || lower.contains("not found") {
        return not_found(target);
    }
    ResourceError::Command {
        program: spec.program.clone(),
        message: failure_message(output),
    }
}

fn failure_message(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        excerpt(stderr, MAX_ERROR_CHARS)
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn first_line(text: &str) -> &str {
    text.lines().find(|line| !line.trim().is_empty()).unwrap_or("").trim()
}

fn parse_json(spec: &CommandSpec, stdout: &str) -> Result<Value, ResourceError> {
    serde_json::from_str(stdout).map_err(|e| ResourceError::Parse {
        program: spec.program.clone(),
        message: e.to_string(),
    })
}

/// `docker compose ps --format json` prints an array on some versions and
/// one object per line on others.
fn parse_compose_ps(spec: &CommandSpec, stdout: &str) -> Result<Vec<Value>, ResourceError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return match parse_json(spec, trimmed)? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        };
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_json(spec, line))
        .collect()
}

fn parse_kubectl_apply(stdout: &str) -> ApplyChange {
    let verbs = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .collect::<Vec<_>>();
    if verbs.contains(&"created") {
        ApplyChange::Created
    } else if !verbs.is_empty() && verbs.iter().all(|verb| *verb == "unchanged") {
        ApplyChange::Unchanged
    } else {
        ApplyChange::Configured
    }
}

fn parse_helm_revision(stdout: &str) -> ApplyChange {
    let revision = stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("REVISION:"))
        .and_then(|rev| rev.trim().parse::<u32>().ok());
    match revision {
        Some(1) => ApplyChange::Created,
        _ => ApplyChange::Configured,
    }
}

fn parse_compose_up(output: &str) -> ApplyChange {
    let states = output
        .lines()
        .filter(|line| line.contains("Container") || line.contains("Network"))
        .filter_map(|line| line.split_whitespace().last())
        .collect::<Vec<_>>();
    if states.contains(&"Created") {
        ApplyChange::Created
    } else if states.iter().all(|state| *state == "Running") {
        ApplyChange::Unchanged
    } else {
        ApplyChange::Configured
    }
}
