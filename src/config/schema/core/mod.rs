mod env_overrides;
mod loader;
#[cfg(test)]
pub(crate) mod test_env;
mod types;
mod validate;

pub use types::{ClusterKind, Config};
