use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn default_repo_name() -> String {
    "open-telemetry".into()
}

fn default_repo_url() -> String {
    "https://open-telemetry.github.io/opentelemetry-helm-charts".into()
}

fn default_chart() -> String {
    "open-telemetry/opentelemetry-collector".into()
}

/// Helm chart carrying the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_repo_name")]
    pub repo_name: String,
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_chart")]
    pub chart: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub values_files: Vec<PathBuf>,
    /// Extra `--set key=value` pairs.
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            repo_name: default_repo_name(),
            repo_url: default_repo_url(),
            chart: default_chart(),
            version: None,
            values_files: Vec::new(),
            set: BTreeMap::new(),
        }
    }
}

fn default_project() -> String {
    "otel-backend".into()
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("~/otel-backend/docker-compose.yaml")
}

fn default_health_path() -> String {
    "/".into()
}

/// Compose-managed observability backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
    /// Path probed on the top-level `endpoint`.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            compose_file: default_compose_file(),
            health_path: default_health_path(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CollectorWorkload {
    DaemonSet,
    Deployment,
}

fn default_workload() -> CollectorWorkload {
    CollectorWorkload::DaemonSet
}

fn default_metrics_port() -> u16 {
    8888
}

fn default_local_metrics_port() -> u16 {
    18888
}

fn default_span_pattern() -> String {
    "ResourceSpans".into()
}

fn default_vsphere_pattern() -> String {
    "vsphere".into()
}

fn default_log_window_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Chart `mode`; decides which workload the release creates.
    #[serde(default = "default_workload")]
    pub workload: CollectorWorkload,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_local_metrics_port")]
    pub local_metrics_port: u16,
    /// Log line marker proving spans reach the collector.
    #[serde(default = "default_span_pattern")]
    pub span_pattern: String,
    /// Marker of vSphere resource attributes in exported telemetry.
    #[serde(default = "default_vsphere_pattern")]
    pub vsphere_pattern: String,
    #[serde(default = "default_log_window_secs")]
    pub log_window_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            workload: default_workload(),
            metrics_port: default_metrics_port(),
            local_metrics_port: default_local_metrics_port(),
            span_pattern: default_span_pattern(),
            vsphere_pattern: default_vsphere_pattern(),
            log_window_secs: default_log_window_secs(),
        }
    }
}

fn default_app_name() -> String {
    "dice-roller".into()
}

fn default_manifest() -> PathBuf {
    PathBuf::from("deploy/sample-app.yaml")
}

fn default_service_port() -> u16 {
    8080
}

fn default_local_port() -> u16 {
    18080
}

fn default_probe_path() -> String {
    "/rolldice".into()
}

/// Instrumented sample workload. Deployment and Service share `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleAppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Defaults to the top-level namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    #[serde(default = "default_service_port")]
    pub service_port: u16,
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

impl Default for SampleAppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            namespace: None,
            manifest: default_manifest(),
            service_port: default_service_port(),
            local_port: default_local_port(),
            probe_path: default_probe_path(),
        }
    }
}
