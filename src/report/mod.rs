mod render;
mod types;

pub use render::{OutputFormat, RenderOptions, ReportFormatter};
pub use types::{
    Counts, FinalReport, OverallStatus, RunReport, RunState, StepOutcome, StepResult,
};
pub(crate) use types::duration_ms;
