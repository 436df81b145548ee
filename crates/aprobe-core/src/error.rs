#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Companion process failed to start: {0}")]
    Startup(String),

    #[error("'{tool}' terminated with non-zero exit code {code}")]
    NonZeroExit { tool: String, code: i32 },

    #[error("Expected output '{expected}' not found in '{tool}' output")]
    MissingOutput { tool: String, expected: String },

    #[error("Could not create dump file {0}")]
    Artifact(String),

    #[error("'{tool}' did not finish within {secs}s and was killed")]
    Timeout { tool: String, secs: u64 },

    #[error("Tool '{0}' not found (set --jdk, APROBE_JDK, TEST_JDK or JAVA_HOME)")]
    ToolNotFound(String),

    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },
}

impl ProbeError {
    /// Wrap a step-local failure with the name of the failing step.
    pub fn step_failed(step: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::StepFailed {
            step: step.into(),
            message: cause.to_string(),
        }
    }
}
