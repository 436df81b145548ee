//! Run report: per-step outcomes, timing and final status.

use anyhow::Result;
use aprobe_core::{OutputFormat, StepOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const PASSED_BANNER: &str = "Test PASSED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    /// Host denies attaching; nothing ran. Not an error.
    PermissionSkipped(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

impl StepReport {
    pub fn new(name: impl Into<String>, outcome: StepOutcome, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            outcome,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: RunStatus,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_run: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}

impl RunReport {
    /// An in-progress report; call [`finish`](Self::finish) when done.
    pub fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            status: RunStatus::Passed,
            steps: Vec::new(),
            not_run: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn permission_skipped(reason: impl Into<String>) -> Self {
        let mut report = Self::begin();
        report.status = RunStatus::PermissionSkipped(reason.into());
        report
    }

    pub fn push(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    pub fn mark_not_run<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.not_run.extend(names.into_iter().map(str::to_string));
    }

    pub fn set_artifacts(&mut self, paths: Vec<PathBuf>) {
        self.artifacts = paths;
    }

    /// Stamp the end time and derive the status from step outcomes.
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        if !matches!(self.status, RunStatus::PermissionSkipped(_)) {
            self.status = if self.failures().next().is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Passed
            };
        }
        self
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Failed => 1,
            RunStatus::Passed | RunStatus::PermissionSkipped(_) => 0,
        }
    }

    pub fn print(&self, format: &OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(self)?),
            OutputFormat::Text => self.print_text(),
        }
        Ok(())
    }

    fn print_text(&self) {
        if let RunStatus::PermissionSkipped(_) = self.status {
            return;
        }
        for step in &self.steps {
            println!(
                "  {:<10} {} ({} ms)",
                step.name, step.outcome, step.elapsed_ms
            );
        }
        for name in &self.not_run {
            println!("  {name:<10} NOT RUN");
        }
        for path in &self.artifacts {
            println!("Kept {}", path.display());
        }
        match self.status {
            RunStatus::Passed => println!("{PASSED_BANNER}"),
            RunStatus::Failed => {
                for step in self.failures() {
                    if let StepOutcome::Failed(reason) = &step.outcome {
                        eprintln!("{reason}");
                    }
                }
            }
            RunStatus::PermissionSkipped(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed(name: &str) -> StepReport {
        StepReport::new(name, StepOutcome::Passed, Duration::from_millis(12))
    }

    #[test]
    fn test_all_passed_or_skipped_is_passed() {
        let mut report = RunReport::begin();
        report.push(passed("clhsdb"));
        report.push(StepReport::new(
            "jstack",
            StepOutcome::Skipped("not here".into()),
            Duration::ZERO,
        ));
        let report = report.finish();

        assert_eq!(report.status, RunStatus::Passed);
        assert_eq!(report.exit_code(), 0);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_any_failure_fails_run() {
        let mut report = RunReport::begin();
        report.push(passed("clhsdb"));
        report.push(StepReport::new(
            "jmap",
            StepOutcome::Failed("Step 'jmap' failed: boom".into()),
            Duration::ZERO,
        ));
        report.mark_not_run(["jinfo", "jsnap"]);
        let report = report.finish();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.not_run, vec!["jinfo", "jsnap"]);
    }

    #[test]
    fn test_permission_skip_exits_zero() {
        let report = RunReport::permission_skipped("ptrace_scope is 1").finish();
        assert_eq!(
            report.status,
            RunStatus::PermissionSkipped("ptrace_scope is 1".into())
        );
        assert_eq!(report.exit_code(), 0);
        assert!(report.steps.is_empty());
    }

    #[test]
    fn test_json_shape() {
        let mut report = RunReport::begin();
        report.push(passed("jinfo"));
        let json = serde_json::to_value(report.finish()).unwrap();

        assert_eq!(json["status"], "passed");
        assert_eq!(json["steps"][0]["name"], "jinfo");
        assert_eq!(json["steps"][0]["status"], "passed");
        assert_eq!(json["steps"][0]["elapsed_ms"], 12);
        assert!(json.get("not_run").is_none());
        assert!(json["started_at"].is_string());
    }
}
