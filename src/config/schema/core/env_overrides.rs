use super::{ClusterKind, Config};
use std::str::FromStr;

impl Config {
    /// Layer `OTEL_ROLLOUT_*` variables over file values. Empty or
    /// unparsable values leave the current setting alone.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("OTEL_ROLLOUT_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.endpoint = endpoint;
        }

        if let Ok(namespace) = std::env::var("OTEL_ROLLOUT_NAMESPACE")
            && !namespace.is_empty()
        {
            self.namespace = namespace;
        }

        if let Ok(release) = std::env::var("OTEL_ROLLOUT_RELEASE")
            && !release.is_empty()
        {
            self.release = release;
        }

        if let Ok(kind) = std::env::var("OTEL_ROLLOUT_CLUSTER_KIND")
            && let Ok(kind) = ClusterKind::from_str(kind.trim())
        {
            self.cluster_kind = kind;
        }

        if let Ok(raw) = std::env::var("OTEL_ROLLOUT_PARALLELISM")
            && let Ok(parallelism) = raw.trim().parse::<usize>()
        {
            self.parallelism = parallelism;
        }

        if let Ok(raw) = std::env::var("OTEL_ROLLOUT_TIMEOUT_SECS")
            && let Ok(secs) = raw.trim().parse::<u64>()
            && secs > 0
        {
            self.timeout_secs = secs;
        }

        if let Ok(context) = std::env::var("OTEL_ROLLOUT_KUBE_CONTEXT")
            && !context.is_empty()
        {
            self.tools.kube_context = Some(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_env::{ENV_LOCK, EnvVarGuard};
    use super::*;

    #[test]
    fn env_values_override_file_values() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _ns = EnvVarGuard::set("OTEL_ROLLOUT_NAMESPACE", "telemetry");
        let _kind = EnvVarGuard::set("OTEL_ROLLOUT_CLUSTER_KIND", "vSphere");
        let _par = EnvVarGuard::set("OTEL_ROLLOUT_PARALLELISM", "3");
        let _ctx = EnvVarGuard::set("OTEL_ROLLOUT_KUBE_CONTEXT", "kind-otel");
        let _endpoint = EnvVarGuard::unset("OTEL_ROLLOUT_ENDPOINT");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.namespace, "telemetry");
        assert_eq!(config.cluster_kind, ClusterKind::Vsphere);
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.tools.kube_context.as_deref(), Some("kind-otel"));
        assert_eq!(config.endpoint, "http://localhost:3301");
    }

    #[test]
    fn empty_and_garbage_values_are_ignored() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _release = EnvVarGuard::set("OTEL_ROLLOUT_RELEASE", "");
        let _timeout = EnvVarGuard::set("OTEL_ROLLOUT_TIMEOUT_SECS", "soon");
        let _zero = EnvVarGuard::set("OTEL_ROLLOUT_PARALLELISM", "-1");
        let _kind = EnvVarGuard::set("OTEL_ROLLOUT_CLUSTER_KIND", "openshift");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.release, "otel-collector");
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.parallelism, 0);
        assert_eq!(config.cluster_kind, ClusterKind::Kind);
    }

    #[test]
    fn zero_timeout_from_env_is_ignored() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _timeout = EnvVarGuard::set("OTEL_ROLLOUT_TIMEOUT_SECS", "0");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.timeout_secs, 300);
    }
}
