use std::sync::Arc;

use otel_rollout::config::ClusterKind;
use otel_rollout::health::CheckStatus;
use otel_rollout::report::{OverallStatus, RunState};

use super::fake_cluster::{FakeCluster, LOGS_WITHOUT_VSPHERE};
use super::{deploy, test_config, validate};

fn status(report: &otel_rollout::report::FinalReport, id: &str) -> CheckStatus {
    report
        .check(id)
        .unwrap_or_else(|| panic!("no check {id} in report"))
        .status
}

#[tokio::test(start_paused = true)]
async fn failed_dependency_skips_downstream_checks() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    deploy(&config, &cluster).await;
    cluster.missing_tool("kubectl");

    let report = validate(&config, &cluster).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(status(&report, "tool-kubectl"), CheckStatus::Failed);
    for id in [
        "cluster-reachable",
        "namespace-present",
        "chart-release",
        "collector-ready",
        "sample-app-ready",
        "collector-metrics",
        "sample-app-http",
        "telemetry-flow",
        "vsphere-metadata",
    ] {
        assert_eq!(status(&report, id), CheckStatus::SkippedDueToDependency, "{id}");
    }
    let skipped = report.check("cluster-reachable").unwrap();
    assert_eq!(skipped.attempts, 0);
    assert!(skipped.error.as_deref().unwrap().contains("tool-kubectl"));

    assert_eq!(status(&report, "tool-helm"), CheckStatus::Passed);
    assert_eq!(status(&report, "backend-health"), CheckStatus::Passed);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn dependent_check_never_probes_before_its_dependency() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    deploy(&config, &cluster).await;
    let before = cluster.calls().len();

    validate(&config, &cluster).await;

    let calls = &cluster.calls()[before..];
    let pos = |prefix: &str| {
        calls
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no call {prefix}"))
    };
    assert!(pos("exec kubectl version") < pos("get namespace/observability"));
    assert!(pos("get namespace/observability") < pos("get daemon_set/otel-collector-agent"));
    assert!(pos("get daemon_set/otel-collector-agent") < pos("port-forward svc/otel-collector"));
}

#[tokio::test(start_paused = true)]
async fn validate_against_nothing_deployed_is_degraded() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());

    let report = validate(&config, &cluster).await;

    assert_eq!(status(&report, "cluster-reachable"), CheckStatus::Passed);
    assert_eq!(status(&report, "namespace-present"), CheckStatus::Failed);
    assert_eq!(status(&report, "collector-ready"), CheckStatus::SkippedDueToDependency);
    assert_eq!(report.status(), OverallStatus::Degraded);
    assert!(report.steps.is_empty());
}

#[tokio::test(start_paused = true)]
async fn vsphere_cluster_makes_metadata_required() {
    let config = otel_rollout::Config {
        cluster_kind: ClusterKind::Vsphere,
        ..test_config()
    };
    let cluster = Arc::new(FakeCluster::new());
    deploy(&config, &cluster).await;
    cluster.set_logs(LOGS_WITHOUT_VSPHERE);

    let report = validate(&config, &cluster).await;

    let vsphere = report.check("vsphere-metadata").unwrap();
    assert!(vsphere.required);
    assert_eq!(vsphere.status, CheckStatus::Failed);
    assert_eq!(vsphere.attempts, 3);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_outage_fails_backend_check_only() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    deploy(&config, &cluster).await;
    cluster.fail_http("localhost:3301");

    let report = validate(&config, &cluster).await;

    assert_eq!(status(&report, "backend-health"), CheckStatus::Failed);
    assert_eq!(status(&report, "collector-metrics"), CheckStatus::Passed);
    assert!(report.check("backend-health").unwrap().error.is_some());
}
