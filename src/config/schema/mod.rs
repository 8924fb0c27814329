mod core;
mod deployment;
mod observability;
mod tools;

pub use self::core::{ClusterKind, Config};
pub use deployment::{BackendConfig, ChartConfig, CollectorConfig, CollectorWorkload, SampleAppConfig};
pub use observability::ObservabilityConfig;
pub use tools::ToolsConfig;
