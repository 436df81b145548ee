//! Process execution: spawning, scripted stdin, output capture, timeouts.

mod analyzer;
mod lib_output_helpers;
mod terminate;

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use lib_output_helpers::{
    Channel, accumulate_and_flush_lines, extract_summary, failure_summary, flush_line_buf,
};
pub use terminate::{is_process_alive, terminate_process_group};

pub const DEFAULT_TERMINATION_GRACE_PERIOD_SECS: u64 = 5;
/// Exit code reported for a process killed after a timeout (128 + SIGKILL).
pub const TIMEOUT_EXIT_CODE: i32 = 137;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// What happens to child stdout while it is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Only accumulate.
    #[default]
    BufferOnly,
    /// Accumulate and print each line, trimmed, to parent stdout.
    EchoStdout,
}

/// Capture settings for [`wait_and_capture`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub stream_mode: StreamMode,
    /// Wall-clock limit. None waits indefinitely.
    pub timeout: Option<Duration>,
    /// Time between SIGTERM and SIGKILL when the timeout fires.
    pub termination_grace: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            stream_mode: StreamMode::BufferOnly,
            timeout: None,
            termination_grace: Duration::from_secs(DEFAULT_TERMINATION_GRACE_PERIOD_SECS),
        }
    }
}

impl CaptureOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

/// Result of executing a command.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Captured stdout.
    pub output: String,
    /// Captured stderr (tee'd to parent stderr in real-time).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr_output: String,
    /// Last non-empty line or truncated output (max 200 chars).
    pub summary: String,
    /// Exit code (128 + signal if signal-killed).
    pub exit_code: i32,
    /// Input written to the child's stdin before it was closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin_input: Option<String>,
    /// True when the process was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        let mut combined = String::with_capacity(self.output.len() + self.stderr_output.len());
        combined.push_str(&self.output);
        combined.push_str(&self.stderr_output);
        combined
    }
}

/// Spawn a tool process without waiting for it to complete.
///
/// - Pipes stdout and stderr for capture
/// - Pipes stdin when `stdin_data` is given, writes it from a background
///   task and closes the pipe afterwards; otherwise stdin is null
/// - Isolates the child in its own session (setsid) so the whole group can
///   be signalled on timeout
/// - Enables kill_on_drop as safety net
pub async fn spawn_tool(mut cmd: Command, stdin_data: Option<Vec<u8>>) -> Result<Child> {
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(if stdin_data.is_some() {
        std::process::Stdio::piped()
    } else {
        std::process::Stdio::null()
    });
    cmd.kill_on_drop(true);

    // SAFETY: setsid() is async-signal-safe and we call it before exec,
    // so no Rust runtime state exists in the child yet.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd.spawn().context("Failed to spawn command")?;

    if let Some(data) = stdin_data {
        let mut stdin = child.stdin.take().context("Failed to open child stdin")?;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&data).await {
                warn!("Failed to write child stdin: {e}");
            }
            // Dropping `stdin` closes the pipe and signals EOF.
        });
    }

    Ok(child)
}

/// Wait for a spawned child process and capture its output.
///
/// Reads stdout and stderr concurrently until both reach EOF, then waits for
/// exit. When `options.timeout` elapses first, the child's process group is
/// terminated and the result is marked `timed_out` with exit code 137.
///
/// The child's stdout and stderr must be piped (see [`spawn_tool`]).
pub async fn wait_and_capture(mut child: Child, options: &CaptureOptions) -> Result<ExecutionResult> {
    let mut stdout = child.stdout.take().context("Failed to capture stdout")?;
    let mut stderr = child.stderr.take().context("Failed to capture stderr")?;

    let deadline = options.timeout.map(|t| tokio::time::Instant::now() + t);

    let mut output = String::new();
    let mut stderr_output = String::new();
    let mut stdout_line = Vec::new();
    let mut stderr_line = Vec::new();
    let mut stdout_chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut stderr_chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut timed_out = false;
    let mut read_error = None;
    let mode = options.stream_mode;

    while !stdout_done || !stderr_done {
        tokio::select! {
            result = stdout.read(&mut stdout_chunk), if !stdout_done => {
                match classify_read(result, Channel::Stdout) {
                    Ok(Some(n)) => accumulate_and_flush_lines(
                        &stdout_chunk[..n], &mut stdout_line, &mut output, Channel::Stdout, mode,
                    ),
                    Ok(None) => stdout_done = true,
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
            result = stderr.read(&mut stderr_chunk), if !stderr_done => {
                match classify_read(result, Channel::Stderr) {
                    Ok(Some(n)) => accumulate_and_flush_lines(
                        &stderr_chunk[..n], &mut stderr_line, &mut stderr_output, Channel::Stderr, mode,
                    ),
                    Ok(None) => stderr_done = true,
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
            _ = sleep_until_deadline(deadline) => {
                timed_out = true;
                break;
            }
        }
    }

    flush_line_buf(&mut stdout_line, &mut output, Channel::Stdout, mode);
    flush_line_buf(&mut stderr_line, &mut stderr_output, Channel::Stderr, mode);

    if let Some(e) = read_error {
        warn!(pid = ?child.id(), "{e:#}, terminating");
        terminate_process_group(&mut child, options.termination_grace).await;
        let _ = child.wait().await;
        return Err(e);
    }

    // Both pipes closed; the child may still be running with stdio detached.
    let status = if timed_out {
        None
    } else {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, child.wait())
                .await
                .ok()
                .transpose()
                .context("Failed to wait for command")?,
            None => Some(child.wait().await.context("Failed to wait for command")?),
        }
    };

    let status = match status {
        Some(status) => status,
        None => {
            timed_out = true;
            warn!(pid = ?child.id(), "Process exceeded timeout, terminating");
            terminate_process_group(&mut child, options.termination_grace).await;
            child.wait().await.context("Failed to wait for command")?
        }
    };

    let exit_code = if timed_out {
        TIMEOUT_EXIT_CODE
    } else {
        exit_code_of(status)
    };
    debug!(exit_code, timed_out, "Process finished");

    let summary = if timed_out {
        let secs = options.timeout.map(|t| t.as_secs()).unwrap_or_default();
        format!("timeout after {secs}s")
    } else if exit_code != 0 {
        failure_summary(&output, &stderr_output, exit_code)
    } else {
        extract_summary(&output)
    };

    Ok(ExecutionResult {
        output,
        stderr_output,
        summary,
        exit_code,
        stdin_input: None,
        timed_out,
    })
}

/// Spawn, optionally feed stdin, and capture until exit or timeout.
pub async fn run_and_capture(
    cmd: Command,
    stdin_data: Option<Vec<u8>>,
    options: &CaptureOptions,
) -> Result<ExecutionResult> {
    let stdin_input = stdin_data
        .as_deref()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
    let child = spawn_tool(cmd, stdin_data).await?;
    let mut result = wait_and_capture(child, options).await?;
    result.stdin_input = stdin_input;
    Ok(result)
}

/// `Ok(Some(n))` for data, `Ok(None)` at EOF, an error for a failed read.
fn classify_read(result: std::io::Result<usize>, channel: Channel) -> Result<Option<usize>> {
    match result {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(e).with_context(|| format!("Failed to read tool {}", channel.name())),
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            warn!(signal, "Process terminated by signal");
            return 128 + signal;
        }
    }
    warn!("Process terminated without exit code, using 1");
    1
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
