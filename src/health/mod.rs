mod graph;
mod probe;
mod suite;
mod types;

pub use graph::DependencyGraph;
pub use probe::{ProbeRunner, ResourceProbeRunner};
pub use suite::HealthCheckSuite;
pub use types::{CheckStatus, DEFAULT_CHECK_TIMEOUT, HealthCheck, HealthOutcome, HealthProbe};
