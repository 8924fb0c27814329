//! The one supported rollout: a compose-managed backend, the collector chart
//! and an instrumented sample app in a single namespace.

use crate::config::{CollectorWorkload, Config};
use crate::health::{HealthCheck, HealthProbe};
use crate::plan::{Plan, Precondition, Step, StepAction};
use crate::resource::{
    ExecTarget, Manifest, ManifestSource, PortForwardSpec, ResourceKind, ResourceRef,
};
use anyhow::Result;

pub const DEPLOY_PLAN: &str = "deploy";
pub const TEARDOWN_PLAN: &str = "teardown";
pub const VALIDATE_PLAN: &str = "validate";

const BOOTSTRAP_GROUP: &str = "bootstrap";

pub fn namespace_ref(config: &Config) -> ResourceRef {
    ResourceRef::new(ResourceKind::Namespace, &config.namespace)
}

pub fn release_ref(config: &Config) -> ResourceRef {
    ResourceRef::new(ResourceKind::HelmRelease, &config.release).in_namespace(&config.namespace)
}

pub fn backend_ref(config: &Config) -> ResourceRef {
    ResourceRef::new(ResourceKind::ComposeProject, &config.backend.project)
}

pub fn collector_ref(config: &Config) -> ResourceRef {
    let kind = match config.collector.workload {
        CollectorWorkload::DaemonSet => ResourceKind::DaemonSet,
        CollectorWorkload::Deployment => ResourceKind::Deployment,
    };
    ResourceRef::new(kind, config.collector_workload_name()).in_namespace(&config.namespace)
}

pub fn sample_app_ref(config: &Config) -> ResourceRef {
    ResourceRef::new(ResourceKind::Deployment, &config.sample_app.name)
        .in_namespace(config.sample_app_namespace())
}

pub fn sample_service_ref(config: &Config) -> ResourceRef {
    ResourceRef::new(ResourceKind::Service, &config.sample_app.name)
        .in_namespace(config.sample_app_namespace())
}

fn namespace_manifest(config: &Config) -> Manifest {
    Manifest::Kubernetes {
        target: namespace_ref(config),
        source: ManifestSource::Inline(format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n",
            config.namespace
        )),
    }
}

/// Chart values pinned by the rollout; user `--set` pairs win on conflict.
fn chart_manifest(config: &Config) -> Manifest {
    let mut set = std::collections::BTreeMap::from([
        ("fullnameOverride".to_string(), config.release.clone()),
        ("mode".to_string(), config.collector.workload.to_string()),
        ("service.enabled".to_string(), "true".to_string()),
        ("ports.metrics.enabled".to_string(), "true".to_string()),
    ]);
    set.extend(config.chart.set.clone());

    Manifest::HelmRelease {
        release: config.release.clone(),
        namespace: config.namespace.clone(),
        chart: config.chart.chart.clone(),
        version: config.chart.version.clone(),
        values_files: config.chart.values_files.clone(),
        set,
    }
}

fn collector_metrics_forward(config: &Config) -> PortForwardSpec {
    PortForwardSpec {
        service: config.release.clone(),
        namespace: config.namespace.clone(),
        local_port: config.collector.local_metrics_port,
        remote_port: config.collector.metrics_port,
    }
}

fn sample_app_forward(config: &Config) -> PortForwardSpec {
    PortForwardSpec {
        service: config.sample_app.name.clone(),
        namespace: config.sample_app_namespace().to_string(),
        local_port: config.sample_app.local_port,
        remote_port: config.sample_app.service_port,
    }
}

pub fn deploy_plan(config: &Config) -> Result<Plan> {
    let timeout = config.step_timeout();
    let retry = config.retry;

    let steps = vec![
        Step::new(
            "chart-repo",
            "Register the collector chart repository",
            StepAction::Exec {
                target: ExecTarget::Local,
                command: vec![
                    config.tools.helm.clone(),
                    "repo".into(),
                    "add".into(),
                    "--force-update".into(),
                    config.chart.repo_name.clone(),
                    config.chart.repo_url.clone(),
                ],
            },
        )
        .fatal()
        .with_retry(retry)
        .with_timeout(timeout)
        .in_group(BOOTSTRAP_GROUP),
        Step::new(
            "backend-up",
            "Start the observability backend",
            StepAction::Apply {
                manifest: Manifest::ComposeProject {
                    project: config.backend.project.clone(),
                    file: config.backend.compose_file.clone(),
                },
            },
        )
        .fatal()
        .with_retry(retry)
        .with_timeout(timeout)
        .in_group(BOOTSTRAP_GROUP),
        Step::new(
            "namespace",
            "Create the target namespace",
            StepAction::Apply {
                manifest: namespace_manifest(config),
            },
        )
        .fatal()
        .with_retry(retry)
        .with_timeout(timeout)
        .in_group(BOOTSTRAP_GROUP),
        Step::new(
            "install-chart",
            "Install or upgrade the collector chart",
            StepAction::Apply {
                manifest: chart_manifest(config),
            },
        )
        .fatal()
        .with_retry(retry)
        .with_timeout(timeout),
        Step::new(
            "wait-ready",
            "Wait for the collector workload",
            StepAction::WaitReady {
                target: collector_ref(config),
            },
        )
        .fatal()
        .with_timeout(timeout),
        Step::new(
            "deploy-sample-app",
            "Deploy the instrumented sample app",
            StepAction::Apply {
                manifest: Manifest::Kubernetes {
                    target: sample_app_ref(config),
                    source: ManifestSource::File(config.sample_app.manifest.clone()),
                },
            },
        )
        .soft()
        .with_retry(retry)
        .with_timeout(timeout),
        Step::new(
            "wait-sample-app",
            "Wait for the sample app",
            StepAction::WaitReady {
                target: sample_app_ref(config),
            },
        )
        .soft()
        .with_timeout(timeout),
        Step::new(
            "smoke-probe",
            "Call the sample app through a port-forward",
            StepAction::ForwardedProbe {
                forward: sample_app_forward(config),
                path: config.sample_app.probe_path.clone(),
                expected_status: 200,
            },
        )
        .soft()
        .with_retry(retry)
        .with_timeout(timeout)
        .with_precondition(Precondition::ResourceExists {
            target: sample_service_ref(config),
        }),
    ];

    Plan::new(DEPLOY_PLAN, "Roll out the OpenTelemetry collector", steps)
}

/// Reverse of `deploy_plan`. Every step is soft and deletes tolerate
/// absence, so running it twice gives the same report.
pub fn teardown_plan(config: &Config, purge: bool) -> Result<Plan> {
    let timeout = config.step_timeout();
    let delete = |id: &str, label: &str, target: ResourceRef| {
        Step::new(id, label, StepAction::Delete { target })
            .soft()
            .with_retry(config.retry)
            .with_timeout(timeout)
    };

    let mut steps = vec![
        delete("remove-sample-app", "Remove the sample app", sample_app_ref(config)),
        delete(
            "remove-sample-service",
            "Remove the sample app service",
            sample_service_ref(config),
        ),
        delete("uninstall-chart", "Uninstall the collector chart", release_ref(config)),
        delete("backend-down", "Stop the observability backend", backend_ref(config)),
    ];
    if purge {
        steps.push(delete("remove-namespace", "Delete the namespace", namespace_ref(config)));
    }

    Plan::new(TEARDOWN_PLAN, "Remove the OpenTelemetry collector rollout", steps)
}

pub fn validation_checks(config: &Config) -> Vec<HealthCheck> {
    let retry = config.retry;
    let tool = |id: &str, program: &str, args: &[&str]| {
        HealthCheck::new(
            id,
            format!("{program} is installed"),
            HealthProbe::ToolAvailable {
                program: program.to_string(),
                args: args.iter().map(ToString::to_string).collect(),
            },
        )
    };
    let logs = |pattern: &str| HealthProbe::LogContains {
        source: collector_ref(config),
        pattern: pattern.to_string(),
        since_secs: config.collector.log_window_secs,
    };

    let vsphere = HealthCheck::new(
        "vsphere-metadata",
        "Telemetry carries vSphere resource attributes",
        logs(&config.collector.vsphere_pattern),
    )
    .depends_on(["collector-ready"])
    .with_retry(retry)
    .required(config.vsphere_required());

    vec![
        tool("tool-kubectl", &config.tools.kubectl, &["version", "--client"]),
        tool("tool-helm", &config.tools.helm, &["version", "--short"]),
        tool("tool-docker", &config.tools.docker, &["compose", "version"]),
        HealthCheck::new(
            "cluster-reachable",
            "Kubernetes API answers",
            HealthProbe::ClusterReachable {
                namespace: config.namespace.clone(),
            },
        )
        .depends_on(["tool-kubectl"])
        .with_retry(retry),
        HealthCheck::new(
            "namespace-present",
            format!("Namespace {} is active", config.namespace),
            HealthProbe::ResourceReady {
                target: namespace_ref(config),
            },
        )
        .depends_on(["cluster-reachable"]),
        HealthCheck::new(
            "chart-release",
            format!("Helm release {} is deployed", config.release),
            HealthProbe::ResourceReady {
                target: release_ref(config),
            },
        )
        .depends_on(["namespace-present", "tool-helm"]),
        HealthCheck::new(
            "collector-ready",
            "Collector workload is ready",
            HealthProbe::ResourceReady {
                target: collector_ref(config),
            },
        )
        .depends_on(["namespace-present"])
        .with_retry(retry),
        HealthCheck::new(
            "sample-app-ready",
            "Sample app is ready",
            HealthProbe::ResourceReady {
                target: sample_app_ref(config),
            },
        )
        .depends_on(["namespace-present"])
        .with_retry(retry),
        HealthCheck::new(
            "backend-health",
            "Observability backend answers",
            HealthProbe::Http {
                url: join_url(&config.endpoint, &config.backend.health_path),
                expected_status: 200,
                body_contains: None,
            },
        )
        .with_retry(retry),
        HealthCheck::new(
            "collector-metrics",
            "Collector exposes its own metrics",
            HealthProbe::ForwardedHttp {
                forward: collector_metrics_forward(config),
                path: "/metrics".into(),
                expected_status: 200,
                body_contains: Some("otelcol_".into()),
            },
        )
        .depends_on(["collector-ready"])
        .with_retry(retry),
        HealthCheck::new(
            "sample-app-http",
            "Sample app serves requests",
            HealthProbe::ForwardedHttp {
                forward: sample_app_forward(config),
                path: config.sample_app.probe_path.clone(),
                expected_status: 200,
                body_contains: None,
            },
        )
        .depends_on(["sample-app-ready"])
        .with_retry(retry),
        HealthCheck::new(
            "telemetry-flow",
            "Spans reach the collector",
            logs(&config.collector.span_pattern),
        )
        .depends_on(["collector-ready", "sample-app-http"])
        .with_retry(retry),
        vsphere,
    ]
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() || path == "/" {
        format!("{base}/")
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterKind;
    use crate::health::DependencyGraph;
    use crate::plan::FailurePolicy;

    fn ids(plan: &Plan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn deploy_plan_layout() {
        let plan = deploy_plan(&Config::default()).unwrap();
        assert_eq!(
            ids(&plan),
            vec![
                "chart-repo",
                "backend-up",
                "namespace",
                "install-chart",
                "wait-ready",
                "deploy-sample-app",
                "wait-sample-app",
                "smoke-probe",
            ]
        );
        assert_eq!(plan.groups()[0], 0..3);
        assert_eq!(plan.groups().len(), 6);

        let fatal: Vec<_> = plan
            .steps
            .iter()
            .filter(|s| s.failure == FailurePolicy::Fatal)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(
            fatal,
            vec!["chart-repo", "backend-up", "namespace", "install-chart", "wait-ready"]
        );
    }

    #[test]
    fn chart_values_pin_release_name_and_mode() {
        let mut config = Config::default();
        config.chart.set.insert("image.tag".into(), "0.109.0".into());
        config.chart.set.insert("mode".into(), "deployment".into());

        let StepAction::Apply {
            manifest: Manifest::HelmRelease { set, .. },
        } = chart_manifest_action(&config)
        else {
            panic!("install-chart must be a helm release");
        };
        assert_eq!(set.get("fullnameOverride").unwrap(), "otel-collector");
        assert_eq!(set.get("image.tag").unwrap(), "0.109.0");
        assert_eq!(set.get("mode").unwrap(), "deployment");
    }

    fn chart_manifest_action(config: &Config) -> StepAction {
        let plan = deploy_plan(config).unwrap();
        plan.step("install-chart").unwrap().action.clone()
    }

    #[test]
    fn teardown_plan_is_soft_and_purge_adds_namespace() {
        let plan = teardown_plan(&Config::default(), false).unwrap();
        assert_eq!(
            ids(&plan),
            vec!["remove-sample-app", "remove-sample-service", "uninstall-chart", "backend-down"]
        );
        assert!(plan.steps.iter().all(|s| s.failure == FailurePolicy::Soft));

        let purged = teardown_plan(&Config::default(), true).unwrap();
        assert_eq!(purged.steps.last().unwrap().id, "remove-namespace");
    }

    #[test]
    fn validation_graph_is_acyclic() {
        let checks = validation_checks(&Config::default());
        let graph = DependencyGraph::build(&checks).unwrap();
        let order = graph.topological_order();
        let pos = |id: &str| order.iter().position(|o| *o == id).unwrap();
        assert!(pos("tool-kubectl") < pos("cluster-reachable"));
        assert!(pos("namespace-present") < pos("collector-ready"));
        assert!(pos("sample-app-http") < pos("telemetry-flow"));
    }

    #[test]
    fn vsphere_check_required_only_on_vsphere() {
        let find = |config: &Config| {
            validation_checks(config)
                .into_iter()
                .find(|c| c.id == "vsphere-metadata")
                .unwrap()
        };
        assert!(!find(&Config::default()).required);
        let config = Config {
            cluster_kind: ClusterKind::Vsphere,
            ..Config::default()
        };
        assert!(find(&config).required);
    }

    #[test]
    fn backend_url_joins_cleanly() {
        assert_eq!(join_url("http://localhost:3301/", "/"), "http://localhost:3301/");
        assert_eq!(join_url("http://localhost:3301", "api/v1/health"), "http://localhost:3301/api/v1/health");
    }
}
