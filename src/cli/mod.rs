mod commands;

pub use commands::{Cli, Commands, DeployArgs, TargetArgs, TeardownArgs, ValidateArgs};
