use std::sync::Arc;

use otel_rollout::app::dispatch;
use otel_rollout::app::topology::validation_checks;
use otel_rollout::health::CheckStatus;
use otel_rollout::report::{OverallStatus, RunState, StepOutcome};
use otel_rollout::resource::{ApplyChange, ResourceClient, ResourceKind};
use tokio_util::sync::CancellationToken;

use super::fake_cluster::{FakeCluster, LOGS_WITHOUT_VSPHERE};
use super::{deploy, deploy_from, observer, outcome, test_config};

#[tokio::test(start_paused = true)]
async fn deploy_completes_and_validates_once() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());

    let report = deploy(&config, &cluster).await;

    assert_eq!(report.state, RunState::Completed);
    assert!(report.steps.iter().all(|s| s.outcome == StepOutcome::Succeeded));
    assert_eq!(report.checks.len(), validation_checks(&config).len());
    assert!(report.checks.iter().all(|c| c.status == CheckStatus::Passed));
    assert_eq!(cluster.calls_matching("exec kubectl version"), 1);
    assert!(report.rollback.is_empty());
    assert_eq!(report.status(), OverallStatus::Healthy);
    assert_eq!(report.exit_code(), 0);
    assert!(cluster.contains(ResourceKind::DaemonSet, "otel-collector-agent"));
}

#[tokio::test(start_paused = true)]
async fn install_failure_aborts_rolls_back_and_skips_the_rest() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    cluster.always_fail_apply("otel-collector");

    let report = deploy(&config, &cluster).await;

    assert_eq!(report.state, RunState::Aborted);
    let install = report.step("install-chart").unwrap();
    assert_eq!(install.outcome, StepOutcome::Failed);
    assert_eq!(install.attempts, 3);
    assert_eq!(cluster.apply_attempts("otel-collector"), 3);
    assert!(install.error.as_deref().unwrap().contains("connection refused"));

    for id in ["wait-ready", "deploy-sample-app", "wait-sample-app", "smoke-probe"] {
        assert_eq!(outcome(&report, id), StepOutcome::Skipped, "{id}");
    }
    assert_eq!(
        report.abort_reason.as_deref(),
        Some("fatal step install-chart failed")
    );

    // Bootstrap applies are undone newest first; the exec step has nothing to undo.
    let rollback: Vec<_> = report.rollback.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(rollback, vec!["rollback:namespace", "rollback:backend-up"]);
    assert!(report.rollback.iter().all(|r| r.outcome == StepOutcome::Succeeded));
    assert_eq!(cluster.object_count(), 0);

    assert!(report.checks.is_empty());
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_bound_follows_max_attempts() {
    let mut config = test_config();
    config.retry.max_attempts = 5;
    let cluster = Arc::new(FakeCluster::new());
    cluster.always_fail_apply("otel-backend");

    let report = deploy(&config, &cluster).await;

    let backend = report.step("backend-up").unwrap();
    assert_eq!(backend.attempts, 5);
    assert_eq!(backend.outcome, StepOutcome::Failed);
    assert_eq!(cluster.apply_attempts("otel-backend"), 5);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_within_retry_budget() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    cluster.fail_apply("otel-collector", 2);

    let report = deploy(&config, &cluster).await;

    let install = report.step("install-chart").unwrap();
    assert_eq!(install.outcome, StepOutcome::Succeeded);
    assert_eq!(install.attempts, 3);
    assert_eq!(report.state, RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn false_precondition_skips_without_running() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    cluster.always_fail_apply("dice-roller");

    let report = deploy(&config, &cluster).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(outcome(&report, "deploy-sample-app"), StepOutcome::Failed);
    let smoke = report.step("smoke-probe").unwrap();
    assert_eq!(smoke.outcome, StepOutcome::Skipped);
    assert_eq!(smoke.attempts, 0);
    assert!(smoke.output.starts_with("precondition not met"));
    assert_eq!(cluster.calls_matching("port-forward svc/dice-roller"), 0);
    assert_eq!(report.status(), OverallStatus::Degraded);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn informational_vsphere_miss_degrades_only() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    cluster.set_logs(LOGS_WITHOUT_VSPHERE);

    let report = deploy(&config, &cluster).await;

    assert_eq!(report.state, RunState::Completed);
    let vsphere = report.check("vsphere-metadata").unwrap();
    assert_eq!(vsphere.status, CheckStatus::Failed);
    assert!(!vsphere.required);
    assert!(
        report
            .checks
            .iter()
            .filter(|c| c.required)
            .all(|c| c.status == CheckStatus::Passed)
    );
    assert_eq!(report.status(), OverallStatus::Degraded);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_deploy_is_an_upsert_no_op() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());

    let first = deploy(&config, &cluster).await;
    let second = deploy(&config, &cluster).await;

    assert!(second.steps.iter().all(|s| s.outcome == StepOutcome::Succeeded));
    assert!(second.step("install-chart").unwrap().output.ends_with("unchanged"));
    assert!(second.step("namespace").unwrap().output.ends_with("unchanged"));

    let passed = |report: &otel_rollout::report::FinalReport| {
        report
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Passed)
            .map(|c| c.id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(passed(&first), passed(&second));
    assert_eq!(second.exit_code(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_redeploy_keeps_resources_it_did_not_create() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    assert_eq!(deploy(&config, &cluster).await.exit_code(), 0);

    cluster.always_fail_apply("otel-collector");
    let report = deploy(&config, &cluster).await;

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(
        report.step("namespace").unwrap().change,
        Some(ApplyChange::Unchanged)
    );
    assert!(report.rollback.is_empty());
    assert_eq!(cluster.calls_matching("delete "), 0);
    assert!(cluster.contains(ResourceKind::Namespace, "observability"));
    assert!(cluster.contains(ResourceKind::ComposeProject, "otel-backend"));
    assert!(cluster.contains(ResourceKind::DaemonSet, "otel-collector-agent"));
}

#[tokio::test(start_paused = true)]
async fn resume_skips_earlier_steps() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());

    let report = deploy_from(&config, &cluster, Some("install-chart")).await;

    for id in ["chart-repo", "backend-up", "namespace"] {
        let step = report.step(id).unwrap();
        assert_eq!(step.outcome, StepOutcome::Skipped);
        assert_eq!(step.output, "resumed past");
    }
    assert_eq!(outcome(&report, "install-chart"), StepOutcome::Succeeded);
    assert_eq!(cluster.apply_attempts("otel-backend"), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_skips_everything_without_rollback() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let client: Arc<dyn ResourceClient> = cluster.clone();
    let report = dispatch::deploy(&config, client, observer(), None, &cancel)
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.abort_reason.as_deref(), Some("run cancelled"));
    assert!(report.steps.iter().all(|s| s.outcome == StepOutcome::Skipped));
    assert!(report.rollback.is_empty());
    assert!(cluster.calls().is_empty());
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test(start_paused = true)]
async fn unknown_resume_step_is_rejected() {
    let config = test_config();
    let client: Arc<dyn ResourceClient> = Arc::new(FakeCluster::new());
    let err = dispatch::deploy(&config, client, observer(), Some("zzz"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown step 'zzz'"));
}
