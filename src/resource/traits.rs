use super::port_forward::PortForwardSession;
use super::readiness;
use crate::error::ResourceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Interval between readiness polls in the default `wait_until_ready`.
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Namespace,
    Deployment,
    DaemonSet,
    StatefulSet,
    Pod,
    Service,
    ConfigMap,
    HelmRelease,
    ComposeProject,
}

impl ResourceKind {
    /// Resource name as understood by `kubectl`, `None` for non-cluster kinds.
    pub fn kubectl_name(self) -> Option<&'static str> {
        match self {
            Self::Namespace => Some("namespace"),
            Self::Deployment => Some("deployment"),
            Self::DaemonSet => Some("daemonset"),
            Self::StatefulSet => Some("statefulset"),
            Self::Pod => Some("pod"),
            Self::Service => Some("service"),
            Self::ConfigMap => Some("configmap"),
            Self::HelmRelease | Self::ComposeProject => None,
        }
    }

    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, Self::Namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} (ns {ns})", self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A live object as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub reference: ResourceRef,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ManifestSource {
    File(PathBuf),
    Inline(String),
}

/// Desired state handed to `ResourceClient::apply`. Applying is an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Manifest {
    Kubernetes {
        target: ResourceRef,
        source: ManifestSource,
    },
    HelmRelease {
        release: String,
        namespace: String,
        chart: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        values_files: Vec<PathBuf>,
        #[serde(default)]
        set: BTreeMap<String, String>,
    },
    ComposeProject {
        project: String,
        file: PathBuf,
    },
}

impl Manifest {
    /// The primary resource this manifest creates; rollback deletes it.
    pub fn target(&self) -> ResourceRef {
        match self {
            Self::Kubernetes { target, .. } => target.clone(),
            Self::HelmRelease {
                release, namespace, ..
            } => ResourceRef::new(ResourceKind::HelmRelease, release.clone())
                .in_namespace(namespace.clone()),
            Self::ComposeProject { project, .. } => {
                ResourceRef::new(ResourceKind::ComposeProject, project.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApplyChange {
    Created,
    Configured,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    pub target: ResourceRef,
    pub change: ApplyChange,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecTarget {
    Local,
    Pod {
        namespace: String,
        name: String,
        #[serde(default)]
        container: Option<String>,
    },
    ComposeService {
        project: String,
        service: String,
    },
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Pod {
                namespace, name, ..
            } => write!(f, "pod/{name} (ns {namespace})"),
            Self::ComposeService { project, service } => write!(f, "{project}/{service}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardSpec {
    pub service: String,
    pub namespace: String,
    pub local_port: u16,
    pub remote_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Typed access to the cluster and compose control planes.
///
/// Implementations hold connection configuration only and are shared
/// read-only by every concurrent step and check. Nothing here retries:
/// `exec`, `logs` and `http_probe` are side-effecting single shots, `apply`
/// is an upsert and `delete` treats an absent resource as success.
pub trait ResourceClient: Send + Sync {
    /// Human-readable backend name (e.g. "cli", "fake")
    fn name(&self) -> &str;

    fn get<'a>(&'a self, target: &'a ResourceRef) -> BoxFuture<'a, Result<Resource, ResourceError>>;

    fn apply<'a>(
        &'a self,
        manifest: &'a Manifest,
    ) -> BoxFuture<'a, Result<AppliedResource, ResourceError>>;

    fn delete<'a>(
        &'a self,
        target: &'a ResourceRef,
    ) -> BoxFuture<'a, Result<DeleteOutcome, ResourceError>>;

    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
    ) -> BoxFuture<'a, Result<ExecOutput, ResourceError>>;

    fn logs<'a>(
        &'a self,
        source: &'a ResourceRef,
        since: Duration,
    ) -> BoxFuture<'a, Result<String, ResourceError>>;

    /// Open a forwarding session; it is torn down on `close()` or drop.
    fn port_forward<'a>(
        &'a self,
        spec: &'a PortForwardSpec,
    ) -> BoxFuture<'a, Result<PortForwardSession, ResourceError>>;

    fn http_probe<'a>(
        &'a self,
        url: &'a str,
        expected_status: u16,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ProbeResponse, ResourceError>>;

    /// Poll `get` until the resource reports ready or `timeout` elapses.
    fn wait_until_ready<'a>(
        &'a self,
        target: &'a ResourceRef,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Resource, ResourceError>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                match self.get(target).await {
                    Ok(resource) if readiness::is_ready(&resource) => return Ok(resource),
                    Ok(_) | Err(ResourceError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }

                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Err(ResourceError::Timeout {
                        operation: format!("wait for {target}"),
                        after: timeout,
                    });
                }
                tokio::time::sleep(READY_POLL_INTERVAL.min(deadline - now)).await;
            }
        })
    }
}
