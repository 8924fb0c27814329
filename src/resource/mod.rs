pub mod cli_client;
pub mod http;
pub mod port_forward;
pub mod process;
pub mod readiness;
pub mod traits;

pub use cli_client::CliResourceClient;
pub use port_forward::{PortForwardSession, local_url, with_port_forward};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use traits::{
    AppliedResource, ApplyChange, BoxFuture, DeleteOutcome, ExecOutput, ExecTarget, Manifest,
    ManifestSource, PortForwardSpec, ProbeResponse, Resource, ResourceClient, ResourceKind,
    ResourceRef,
};
