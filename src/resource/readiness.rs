use super::traits::{Resource, ResourceKind};
use serde_json::Value;

/// Whether a live object has converged, judged from its reported status.
pub fn is_ready(resource: &Resource) -> bool {
    let body = &resource.body;
    match resource.reference.kind {
        ResourceKind::Deployment | ResourceKind::StatefulSet => {
            replicas_ready(body, "readyReplicas") && generation_observed(body)
        }
        ResourceKind::DaemonSet => daemon_set_ready(body),
        ResourceKind::Pod => pod_ready(body),
        ResourceKind::Namespace => str_at(body, &["status", "phase"]) == Some("Active"),
        ResourceKind::HelmRelease => str_at(body, &["info", "status"]) == Some("deployed"),
        ResourceKind::ComposeProject => compose_ready(body),
        ResourceKind::Service | ResourceKind::ConfigMap => true,
    }
}

fn value_at<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(body, |current, key| current.get(*key))
}

fn str_at<'a>(body: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at(body, path).and_then(Value::as_str)
}

fn u64_at(body: &Value, path: &[&str]) -> Option<u64> {
    value_at(body, path).and_then(Value::as_u64)
}

fn replicas_ready(body: &Value, ready_field: &str) -> bool {
    let desired = u64_at(body, &["spec", "replicas"]).unwrap_or(1);
    let ready = u64_at(body, &["status", ready_field]).unwrap_or(0);
    ready >= desired
}

fn generation_observed(body: &Value) -> bool {
    match (
        u64_at(body, &["metadata", "generation"]),
        u64_at(body, &["status", "observedGeneration"]),
    ) {
        (Some(generation), Some(observed)) => observed >= generation,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn daemon_set_ready(body: &Value) -> bool {
    let desired = u64_at(body, &["status", "desiredNumberScheduled"]).unwrap_or(0);
    let ready = u64_at(body, &["status", "numberReady"]).unwrap_or(0);
    let updated = u64_at(body, &["status", "updatedNumberScheduled"]).unwrap_or(desired);
    desired > 0 && ready >= desired && updated >= desired
}

fn pod_ready(body: &Value) -> bool {
    value_at(body, &["status", "conditions"])
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|condition| {
                condition.get("type").and_then(Value::as_str) == Some("Ready")
                    && condition.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

fn compose_ready(body: &Value) -> bool {
    let Some(containers) = body.as_array() else {
        return false;
    };
    !containers.is_empty()
        && containers.iter().all(|container| {
            let running = container
                .get("State")
                .and_then(Value::as_str)
                .is_some_and(|state| state.eq_ignore_ascii_case("running"));
            let health = container
                .get("Health")
                .and_then(Value::as_str)
                .unwrap_or_default();
            running && (health.is_empty() || health.eq_ignore_ascii_case("healthy"))
        })
}
