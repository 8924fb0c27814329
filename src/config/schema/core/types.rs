use crate::config::schema::{
    BackendConfig, ChartConfig, CollectorConfig, CollectorWorkload, ObservabilityConfig,
    SampleAppConfig, ToolsConfig,
};
use crate::plan::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Kubernetes distribution the collector is rolled out to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ClusterKind {
    #[default]
    Kind,
    Minikube,
    K3s,
    Eks,
    Gke,
    Aks,
    Vsphere,
    Other,
}

fn default_endpoint() -> String {
    "http://localhost:3301".into()
}

fn default_namespace() -> String {
    "observability".into()
}

fn default_release() -> String {
    "otel-collector".into()
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the config was read from; `None` for built-in defaults.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Observability backend address (HTTP).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_release")]
    pub release: String,
    #[serde(default)]
    pub cluster_kind: ClusterKind,
    /// Max concurrent steps per group and checks per suite. `0` = unbounded.
    #[serde(default)]
    pub parallelism: usize,
    /// Default per-step timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whole-run deadline; cancels in-flight work when exceeded.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub sample_app: SampleAppConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            endpoint: default_endpoint(),
            namespace: default_namespace(),
            release: default_release(),
            cluster_kind: ClusterKind::default(),
            parallelism: 0,
            timeout_secs: default_timeout_secs(),
            run_timeout_secs: None,
            chart: ChartConfig::default(),
            backend: BackendConfig::default(),
            collector: CollectorConfig::default(),
            sample_app: SampleAppConfig::default(),
            retry: RetryPolicy::default(),
            tools: ToolsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn sample_app_namespace(&self) -> &str {
        self.sample_app
            .namespace
            .as_deref()
            .unwrap_or(&self.namespace)
    }

    /// Name of the workload the chart creates. The chart suffixes the
    /// daemonset flavour with `-agent`.
    pub fn collector_workload_name(&self) -> String {
        match self.collector.workload {
            CollectorWorkload::DaemonSet => format!("{}-agent", self.release),
            CollectorWorkload::Deployment => self.release.clone(),
        }
    }

    pub fn vsphere_required(&self) -> bool {
        self.cluster_kind == ClusterKind::Vsphere
    }
}
