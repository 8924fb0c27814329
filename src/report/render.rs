use super::types::{FinalReport, OverallStatus, StepOutcome, StepResult};
use crate::error::ReportError;
use crate::health::{CheckStatus, HealthOutcome};
use crate::ui::style::Palette;
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub color: bool,
    /// Error excerpts are cut to this many characters.
    pub max_error_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color: false,
            max_error_chars: 160,
        }
    }
}

/// Turns a finished run into something for a human or a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFormatter {
    options: RenderOptions,
}

impl ReportFormatter {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn render(&self, report: &FinalReport, format: OutputFormat) -> Result<String, ReportError> {
        match format {
            OutputFormat::Text => Ok(self.render_text(report)),
            OutputFormat::Json => self.render_json(report),
        }
    }

    pub fn render_json(&self, report: &FinalReport) -> Result<String, ReportError> {
        let mut value =
            serde_json::to_value(report).map_err(|e| ReportError::Serialize(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            let status = report.status();
            map.insert("status".into(), serde_json::json!(status));
            map.insert("exit_code".into(), serde_json::json!(status.exit_code()));
            map.insert("counts".into(), serde_json::json!(report.counts()));
        }
        serde_json::to_string_pretty(&value).map_err(|e| ReportError::Serialize(e.to_string()))
    }

    pub fn render_text(&self, report: &FinalReport) -> String {
        let p = Palette::new(self.options.color);
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{} {} {}",
            p.header(format!("{} run", report.plan)),
            p.dim(report.run_id),
            p.dim(format!("({})", format_duration(report.duration)))
        );

        if !report.steps.is_empty() {
            let _ = writeln!(out, "\n{}", p.header("Steps"));
            for step in &report.steps {
                self.write_step(&mut out, p, step);
            }
        }

        if let Some(reason) = &report.abort_reason {
            let _ = writeln!(out, "\n{} {}", p.failure("aborted:"), reason);
        }

        if !report.rollback.is_empty() {
            let _ = writeln!(out, "\n{}", p.header("Rollback"));
            for step in &report.rollback {
                self.write_step(&mut out, p, step);
            }
        }

        if !report.checks.is_empty() {
            let _ = writeln!(out, "\n{}", p.header("Health checks"));
            for check in &report.checks {
                self.write_check(&mut out, p, check);
            }
        }

        let counts = report.counts();
        let _ = writeln!(
            out,
            "\n{} total, {} passed, {} failed, {} skipped",
            counts.total, counts.passed, counts.failed, counts.skipped
        );

        let status = report.status();
        let label = match status {
            OverallStatus::Healthy => p.success(status),
            OverallStatus::Degraded => p.warn(status),
            OverallStatus::Fatal => p.failure(status),
        };
        let _ = writeln!(out, "status: {label} (exit {})", status.exit_code());
        out
    }

    fn write_step(&self, out: &mut String, p: Palette, step: &StepResult) {
        let symbol = match step.outcome {
            StepOutcome::Succeeded => p.success("✅"),
            StepOutcome::Failed => p.failure("❌"),
            StepOutcome::TimedOut => p.failure("⏱"),
            StepOutcome::Skipped => p.dim("⏭"),
            StepOutcome::Cancelled => p.failure("🚫"),
        };
        let _ = write!(
            out,
            "  {symbol} {} {}",
            p.accent(&step.id),
            p.dim(format!(
                "{} {}",
                step.outcome,
                attempts_and_duration(step.attempts, step.duration)
            ))
        );
        self.write_detail(out, p, step.error.as_deref(), skip_reason(step));
    }

    fn write_check(&self, out: &mut String, p: Palette, check: &HealthOutcome) {
        let symbol = match check.status {
            CheckStatus::Passed => p.success("✅"),
            CheckStatus::Failed if !check.required => p.warn("⚠️"),
            CheckStatus::Failed => p.failure("❌"),
            CheckStatus::TimedOut => p.failure("⏱"),
            CheckStatus::SkippedDueToDependency => p.dim("⏭"),
            CheckStatus::Cancelled => p.failure("🚫"),
        };
        let required = if check.required { "" } else { " informational" };
        let _ = write!(
            out,
            "  {symbol} {} {}",
            p.accent(&check.id),
            p.dim(format!(
                "{}{required} {}",
                check.status,
                attempts_and_duration(check.attempts, check.duration)
            ))
        );
        self.write_detail(out, p, check.error.as_deref(), None);
    }

    fn write_detail(&self, out: &mut String, p: Palette, error: Option<&str>, reason: Option<&str>) {
        if let Some(error) = error
            && !error.is_empty()
        {
            let _ = write!(out, " {}", p.failure(excerpt(error, self.options.max_error_chars)));
        } else if let Some(reason) = reason
            && !reason.is_empty()
        {
            let _ = write!(out, " {}", p.dim(excerpt(reason, self.options.max_error_chars)));
        }
        out.push('\n');
    }
}

fn skip_reason(step: &StepResult) -> Option<&str> {
    (step.outcome == StepOutcome::Skipped).then_some(step.output.as_str())
}

fn attempts_and_duration(attempts: u32, duration: Duration) -> String {
    match attempts {
        0 => format!("[{}]", format_duration(duration)),
        1 => format!("[1 attempt, {}]", format_duration(duration)),
        n => format!("[{n} attempts, {}]", format_duration(duration)),
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// First line of `text`, cut to `max` characters.
fn excerpt(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthCheck, HealthProbe};
    use crate::plan::{Step, StepAction};
    use crate::report::RunReport;

    fn step_result(id: &str, outcome: StepOutcome, error: Option<&str>) -> StepResult {
        let step = Step::new(id, id, StepAction::Checkpoint { label: id.into() });
        StepResult {
            outcome,
            attempts: 1,
            duration: Duration::from_millis(1_500),
            error: error.map(str::to_string),
            ..StepResult::skipped(&step, "")
        }
    }

    fn check_outcome(id: &str, status: CheckStatus, required: bool) -> HealthOutcome {
        let check = HealthCheck::new(
            id,
            id,
            HealthProbe::ToolAvailable {
                program: "kubectl".into(),
                args: vec!["version".into()],
            },
        )
        .required(required);
        HealthOutcome {
            status,
            attempts: 1,
            error: None,
            ..HealthOutcome::skipped(&check, "")
        }
    }

    fn sample_report() -> FinalReport {
        let mut report = RunReport::new("deploy");
        report.start();
        report
            .record_step(step_result("namespace", StepOutcome::Succeeded, None))
            .unwrap();
        report
            .record_step(step_result(
                "install-chart",
                StepOutcome::Failed,
                Some("helm exited 1: Error: INSTALLATION FAILED\nstack trace"),
            ))
            .unwrap();
        report.abort("fatal step install-chart failed");
        report.finish()
    }

    #[test]
    fn text_report_lists_steps_status_and_exit_code() {
        let text = ReportFormatter::default().render_text(&sample_report());
        assert!(text.contains("✅ namespace succeeded [1 attempt, 1.5s]"));
        assert!(text.contains("❌ install-chart failed"));
        assert!(text.contains("helm exited 1: Error: INSTALLATION FAILED"));
        assert!(!text.contains("stack trace"));
        assert!(text.contains("aborted: fatal step install-chart failed"));
        assert!(text.contains("2 total, 1 passed, 1 failed, 0 skipped"));
        assert!(text.contains("status: fatal (exit 2)"));
    }

    #[test]
    fn informational_check_failure_is_marked_as_warning() {
        let mut report = RunReport::new("validate");
        report.start();
        report
            .record_check(check_outcome("backend-health", CheckStatus::Passed, true))
            .unwrap();
        report
            .record_check(check_outcome("vsphere-metadata", CheckStatus::Failed, false))
            .unwrap();
        report.complete();

        let text = ReportFormatter::default().render_text(&report.finish());
        assert!(text.contains("⚠️ vsphere-metadata failed informational"));
        assert!(text.contains("status: degraded (exit 1)"));
    }

    #[test]
    fn json_report_carries_status_and_counts() {
        let json = ReportFormatter::default()
            .render(&sample_report(), OutputFormat::Json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "fatal");
        assert_eq!(value["exit_code"], 2);
        assert_eq!(value["counts"]["failed"], 1);
        assert_eq!(value["steps"][1]["outcome"], "failed");
        assert_eq!(value["steps"][0]["duration_ms"], 1500);
    }

    #[test]
    fn excerpt_keeps_first_line_and_caps_length() {
        assert_eq!(excerpt("first\nsecond", 160), "first");
        let long = "x".repeat(200);
        let cut = excerpt(&long, 160);
        assert_eq!(cut.chars().count(), 160);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn durations_are_human_readable() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2_500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }
}
