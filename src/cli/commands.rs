use crate::report::OutputFormat;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// `otel-rollout` - deploy and validate an OpenTelemetry collector rollout.
#[derive(Parser, Debug)]
#[command(name = "otel-rollout")]
#[command(version)]
#[command(
    about = "Deploy, tear down and validate an OpenTelemetry collector on Kubernetes.",
    long_about = None
)]
pub struct Cli {
    /// Config file (default: ~/.otel-rollout/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Report format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the backend, collector chart and sample app, then validate
    Deploy(DeployArgs),

    /// Remove everything `deploy` created
    Teardown(TeardownArgs),

    /// Run the health-check suite against the current state
    Validate(ValidateArgs),
}

/// Overrides shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Observability backend endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Target namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Helm release name of the collector
    #[arg(long)]
    pub release: Option<String>,

    /// Cluster distribution (kind, minikube, k3s, eks, gke, aks, vsphere, other)
    #[arg(long)]
    pub cluster_kind: Option<String>,

    /// Per-step timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Max concurrent steps per group (0 = unbounded)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Skip every step before STEP
    #[arg(long, value_name = "STEP")]
    pub resume_from: Option<String>,

    /// Print the plan without running it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TeardownArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Also delete the namespace
    #[arg(long)]
    pub purge: bool,

    /// Print the plan without running it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Max concurrent health checks (0 = unbounded)
    #[arg(long)]
    pub parallelism: Option<usize>,
}
