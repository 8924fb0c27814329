pub mod schema;

pub use schema::{
    BackendConfig, ChartConfig, ClusterKind, CollectorConfig, CollectorWorkload, Config,
    ObservabilityConfig, SampleAppConfig, ToolsConfig,
};
