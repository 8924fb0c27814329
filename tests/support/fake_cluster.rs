#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use otel_rollout::error::ResourceError;
use otel_rollout::resource::{
    AppliedResource, ApplyChange, BoxFuture, DeleteOutcome, ExecOutput, ExecTarget, Manifest,
    PortForwardSession, PortForwardSpec, ProbeResponse, Resource, ResourceClient, ResourceKind,
    ResourceRef,
};
use serde_json::{Value, json};

pub const HEALTHY_LOGS: &str = "\
2026-10-19T10:00:00Z info ResourceSpans #0 service.name=dice-roller
2026-10-19T10:00:01Z info Resource attributes: vsphere.vm.name=worker-1
";

pub const LOGS_WITHOUT_VSPHERE: &str = "\
2026-10-19T10:00:00Z info ResourceSpans #0 service.name=dice-roller
";

/// In-memory cluster plus compose host. Applies converge immediately;
/// failures are injected per resource name.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ResourceRef, Value>,
    /// Remaining failing applies per resource name; `usize::MAX` never recovers.
    apply_failures: BTreeMap<String, usize>,
    apply_attempts: BTreeMap<String, usize>,
    missing_tools: BTreeSet<String>,
    failing_urls: BTreeSet<String>,
    logs: String,
    calls: Vec<String>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let cluster = Self::default();
        cluster.set_logs(HEALTHY_LOGS);
        cluster
    }

    pub fn fail_apply(&self, name: &str, times: usize) {
        self.lock().apply_failures.insert(name.to_string(), times);
    }

    pub fn always_fail_apply(&self, name: &str) {
        self.fail_apply(name, usize::MAX);
    }

    pub fn missing_tool(&self, program: &str) {
        self.lock().missing_tools.insert(program.to_string());
    }

    /// Probes of any URL containing `fragment` answer 503.
    pub fn fail_http(&self, fragment: &str) {
        self.lock().failing_urls.insert(fragment.to_string());
    }

    pub fn set_logs(&self, logs: &str) {
        self.lock().logs = logs.to_string();
    }

    pub fn apply_attempts(&self, name: &str) -> usize {
        self.lock().apply_attempts.get(name).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.lock()
            .objects
            .keys()
            .any(|key| key.kind == kind && key.name == name)
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn ready_body(kind: ResourceKind) -> Value {
    match kind {
        ResourceKind::Namespace => json!({"status": {"phase": "Active"}}),
        ResourceKind::Deployment | ResourceKind::StatefulSet => {
            json!({"spec": {"replicas": 1}, "status": {"readyReplicas": 1}})
        }
        ResourceKind::DaemonSet => json!({"status": {
            "desiredNumberScheduled": 1,
            "numberReady": 1,
            "updatedNumberScheduled": 1
        }}),
        ResourceKind::Pod => json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}}),
        ResourceKind::HelmRelease => json!({"info": {"status": "deployed"}}),
        ResourceKind::ComposeProject => json!([{"Service": "backend", "State": "running"}]),
        ResourceKind::Service | ResourceKind::ConfigMap => json!({}),
    }
}

/// Everything an apply of `manifest` brings into existence.
fn created_objects(manifest: &Manifest) -> Vec<ResourceRef> {
    let target = manifest.target();
    match manifest {
        Manifest::HelmRelease {
            release,
            namespace,
            set,
            ..
        } => {
            let workload = match set.get("mode").map(String::as_str) {
                Some("deployment") => ResourceRef::new(ResourceKind::Deployment, release.clone()),
                _ => ResourceRef::new(ResourceKind::DaemonSet, format!("{release}-agent")),
            };
            vec![
                target,
                workload.in_namespace(namespace.clone()),
                ResourceRef::new(ResourceKind::Service, release.clone())
                    .in_namespace(namespace.clone()),
            ]
        }
        Manifest::Kubernetes { .. } if target.kind == ResourceKind::Deployment => {
            let mut service = ResourceRef::new(ResourceKind::Service, target.name.clone());
            service.namespace.clone_from(&target.namespace);
            vec![target, service]
        }
        _ => vec![target],
    }
}

impl ResourceClient for FakeCluster {
    fn name(&self) -> &str {
        "fake"
    }

    fn get<'a>(&'a self, target: &'a ResourceRef) -> BoxFuture<'a, Result<Resource, ResourceError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("get {target}"));
            match state.objects.get(target) {
                Some(body) => Ok(Resource {
                    reference: target.clone(),
                    body: body.clone(),
                }),
                None => Err(ResourceError::NotFound {
                    target: target.to_string(),
                }),
            }
        })
    }

    fn apply<'a>(
        &'a self,
        manifest: &'a Manifest,
    ) -> BoxFuture<'a, Result<AppliedResource, ResourceError>> {
        Box::pin(async move {
            let target = manifest.target();
            let mut state = self.lock();
            state.calls.push(format!("apply {target}"));
            *state.apply_attempts.entry(target.name.clone()).or_default() += 1;

            if let Some(remaining) = state.apply_failures.get_mut(&target.name)
                && *remaining > 0
            {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(ResourceError::Apply {
                    target: target.to_string(),
                    details: "connection refused".into(),
                });
            }

            let change = if state.objects.contains_key(&target) {
                ApplyChange::Unchanged
            } else {
                ApplyChange::Created
            };
            for object in created_objects(manifest) {
                let body = ready_body(object.kind);
                state.objects.entry(object).or_insert(body);
            }
            Ok(AppliedResource {
                target,
                change,
                detail: String::new(),
            })
        })
    }

    fn delete<'a>(
        &'a self,
        target: &'a ResourceRef,
    ) -> BoxFuture<'a, Result<DeleteOutcome, ResourceError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("delete {target}"));
            if state.objects.remove(target).is_none() {
                return Ok(DeleteOutcome::AlreadyAbsent);
            }
            match target.kind {
                ResourceKind::HelmRelease => {
                    let release = target.name.clone();
                    state.objects.retain(|key, _| {
                        key.namespace != target.namespace
                            || !(key.name == release || key.name == format!("{release}-agent"))
                    });
                }
                ResourceKind::Namespace => {
                    let namespace = Some(target.name.clone());
                    state.objects.retain(|key, _| key.namespace != namespace);
                }
                _ => {}
            }
            Ok(DeleteOutcome::Deleted)
        })
    }

    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
    ) -> BoxFuture<'a, Result<ExecOutput, ResourceError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("exec {}", command.join(" ")));
            let program = command.first().cloned().unwrap_or_default();
            if matches!(target, ExecTarget::Local) && state.missing_tools.contains(&program) {
                return Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: format!("{program}: command not found"),
                    exit_code: 127,
                });
            }
            Ok(ExecOutput {
                stdout: format!("{program} ok\n"),
                stderr: String::new(),
                exit_code: 0,
            })
        })
    }

    fn logs<'a>(
        &'a self,
        source: &'a ResourceRef,
        _since: Duration,
    ) -> BoxFuture<'a, Result<String, ResourceError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("logs {source}"));
            if !state.objects.contains_key(source) {
                return Err(ResourceError::NotFound {
                    target: source.to_string(),
                });
            }
            Ok(state.logs.clone())
        })
    }

    fn port_forward<'a>(
        &'a self,
        spec: &'a PortForwardSpec,
    ) -> BoxFuture<'a, Result<PortForwardSession, ResourceError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("port-forward svc/{}", spec.service));
            let service = ResourceRef::new(ResourceKind::Service, spec.service.clone())
                .in_namespace(spec.namespace.clone());
            if !state.objects.contains_key(&service) {
                return Err(ResourceError::PortForward {
                    service: spec.service.clone(),
                    message: "service not found".into(),
                });
            }
            Ok(PortForwardSession::detached(
                spec.service.clone(),
                spec.local_port,
            ))
        })
    }

    fn http_probe<'a>(
        &'a self,
        url: &'a str,
        expected_status: u16,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<ProbeResponse, ResourceError>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(format!("http {url}"));
            if state.failing_urls.iter().any(|fragment| url.contains(fragment.as_str())) {
                return Err(ResourceError::Probe {
                    url: url.to_string(),
                    status: Some(503),
                    message: format!("unexpected status 503, expected {expected_status}"),
                });
            }
            let body = if url.ends_with("/metrics") {
                "otelcol_process_uptime{service_instance_id=\"a\"} 42\n".to_string()
            } else {
                "4".to_string()
            };
            Ok(ProbeResponse {
                status: expected_status,
                body,
            })
        })
    }
}
