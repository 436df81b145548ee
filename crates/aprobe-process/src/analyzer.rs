//! Assertions over a finished [`ExecutionResult`].

use aprobe_core::ProbeError;

use crate::ExecutionResult;

impl ExecutionResult {
    /// Fail unless `expected` appears in stdout or stderr.
    pub fn should_contain(&self, tool: &str, expected: &str) -> Result<(), ProbeError> {
        if self.combined_output().contains(expected) {
            return Ok(());
        }
        tracing::debug!(
            tool,
            expected,
            summary = %self.summary,
            "Expected output missing"
        );
        Err(ProbeError::MissingOutput {
            tool: tool.to_string(),
            expected: expected.to_string(),
        })
    }

    /// Fail unless the process exited with `expected`.
    pub fn should_have_exit_value(&self, tool: &str, expected: i32) -> Result<(), ProbeError> {
        if self.exit_code == expected {
            Ok(())
        } else {
            Err(ProbeError::NonZeroExit {
                tool: tool.to_string(),
                code: self.exit_code,
            })
        }
    }

    /// Fail if the process had to be killed for exceeding `timeout_secs`.
    pub fn should_have_completed(&self, tool: &str, timeout_secs: u64) -> Result<(), ProbeError> {
        if self.timed_out {
            Err(ProbeError::Timeout {
                tool: tool.to_string(),
                secs: timeout_secs,
            })
        } else {
            Ok(())
        }
    }
}
