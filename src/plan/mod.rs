mod executor;
mod orchestrator;
mod retry;
mod runner;
mod types;

pub use executor::StepExecutor;
pub use orchestrator::{Orchestrator, RollbackHook, TeardownRollback, Validator};
pub use retry::{RetryOutcome, RetryPolicy, retry_with_backoff};
pub use runner::{ActionOutput, ResourceStepRunner, StepRunner};
pub use types::{DEFAULT_STEP_TIMEOUT, FailurePolicy, Plan, Precondition, Step, StepAction};
