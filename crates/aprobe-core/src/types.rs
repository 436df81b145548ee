use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Diagnostic tool subcommand passed as the first tool argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    Clhsdb,
    Jstack,
    Jmap,
    Jinfo,
    Jsnap,
}

impl ToolMode {
    /// Returns the subcommand as the tool expects it on its command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clhsdb => "clhsdb",
            Self::Jstack => "jstack",
            Self::Jmap => "jmap",
            Self::Jinfo => "jinfo",
            Self::Jsnap => "jsnap",
        }
    }

    /// Substring a successful run of this mode prints.
    ///
    /// `None` for the interactive shell, whose transcript is free-form.
    pub fn expected_output(&self) -> Option<&'static str> {
        match self {
            Self::Clhsdb => None,
            Self::Jstack => Some("No deadlocks found"),
            Self::Jmap => Some("compiler detected"),
            Self::Jinfo => Some("Java System Properties"),
            Self::Jsnap => Some("java.threads"),
        }
    }
}

impl std::fmt::Display for ToolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one harness step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum StepOutcome {
    Passed,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Skipped(reason) => write!(f, "SKIPPED ({reason})"),
            Self::Failed(reason) => write!(f, "FAILED ({reason})"),
        }
    }
}

/// Output format for CLI responses
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_mode_as_str() {
        assert_eq!(ToolMode::Clhsdb.as_str(), "clhsdb");
        assert_eq!(ToolMode::Jsnap.to_string(), "jsnap");
    }

    #[test]
    fn test_expected_output_per_mode() {
        assert_eq!(ToolMode::Clhsdb.expected_output(), None);
        assert_eq!(
            ToolMode::Jstack.expected_output(),
            Some("No deadlocks found")
        );
        assert_eq!(ToolMode::Jmap.expected_output(), Some("compiler detected"));
        assert_eq!(
            ToolMode::Jinfo.expected_output(),
            Some("Java System Properties")
        );
        assert_eq!(ToolMode::Jsnap.expected_output(), Some("java.threads"));
    }

    #[test]
    fn test_tool_mode_value_enum_parses_lowercase() {
        let mode = ToolMode::from_str("jinfo", true).unwrap();
        assert_eq!(mode, ToolMode::Jinfo);
    }

    #[test]
    fn test_step_outcome_is_failure() {
        assert!(StepOutcome::Failed("x".into()).is_failure());
        assert!(!StepOutcome::Skipped("x".into()).is_failure());
        assert!(!StepOutcome::Passed.is_failure());
    }

    #[test]
    fn test_step_outcome_serializes_tagged() {
        let json = serde_json::to_value(StepOutcome::Skipped("darwin".into())).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "darwin");

        let json = serde_json::to_value(StepOutcome::Passed).unwrap();
        assert_eq!(json["status"], "passed");
    }

    #[test]
    fn test_step_outcome_display() {
        assert_eq!(StepOutcome::Passed.to_string(), "PASSED");
        assert_eq!(
            StepOutcome::Failed("boom".into()).to_string(),
            "FAILED (boom)"
        );
    }
}
