use std::sync::Arc;

use otel_rollout::report::{RunState, StepOutcome};
use otel_rollout::resource::ResourceKind;

use super::fake_cluster::FakeCluster;
use super::{deploy, shape, teardown, test_config};

#[tokio::test(start_paused = true)]
async fn teardown_twice_yields_identical_reports() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    deploy(&config, &cluster).await;

    let first = teardown(&config, &cluster, false).await;
    let second = teardown(&config, &cluster, false).await;

    assert_eq!(shape(&first), shape(&second));
    assert!(second.steps.iter().all(|s| s.outcome == StepOutcome::Succeeded));
    assert!(
        second
            .steps
            .iter()
            .all(|s| s.output.ends_with("already absent"))
    );
    assert_eq!(first.exit_code(), 0);
    assert_eq!(second.exit_code(), 0);
    assert!(second.checks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn teardown_on_empty_cluster_succeeds() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());

    let report = teardown(&config, &cluster, true).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.steps.len(), 5);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test(start_paused = true)]
async fn purge_removes_the_namespace() {
    let config = test_config();
    let cluster = Arc::new(FakeCluster::new());
    deploy(&config, &cluster).await;
    assert!(cluster.contains(ResourceKind::Namespace, "observability"));

    let report = teardown(&config, &cluster, true).await;

    assert_eq!(report.step("remove-namespace").unwrap().outcome, StepOutcome::Succeeded);
    assert!(!cluster.contains(ResourceKind::Namespace, "observability"));
    assert_eq!(cluster.object_count(), 0);
}
