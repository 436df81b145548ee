//! Companion (diagnostic target) process lifecycle.
//!
//! The companion is told to live as long as a lock file exists:
//!
//! 1. The harness creates `lingeredapp.<random>.lck` and passes its path as the
//!    companion's last argument.
//! 2. The companion periodically touches the file. The first mtime change
//!    marks it ready.
//! 3. To stop, the harness deletes the file, waits for a clean exit, and
//!    kills the process group if the grace period runs out.
//!
//! [`CompanionProcess`] owns the child and the lock file. `stop()` is
//! idempotent; `Drop` kills a still-running child so panics never leak it.

use anyhow::{Context, Result};
use aprobe_core::ProbeError;
use aprobe_process::terminate_process_group;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempPath;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_secs(1);

/// How to launch a companion process.
#[derive(Debug, Clone)]
pub struct CompanionSpec {
    pub program: PathBuf,
    /// Arguments placed before the lock file path.
    pub args: Vec<String>,
    /// Directory that receives the lock file.
    pub lock_dir: PathBuf,
    pub ready_timeout: Duration,
    pub stop_timeout: Duration,
}

impl CompanionSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            lock_dir: std::env::temp_dir(),
            ready_timeout: Duration::from_secs(100),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionState {
    NotStarted,
    Running,
    Stopped,
}

pub struct CompanionProcess {
    spec: CompanionSpec,
    state: CompanionState,
    child: Option<Child>,
    pid: Option<u32>,
    lock_file: Option<TempPath>,
}

impl std::fmt::Debug for CompanionProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanionProcess")
            .field("program", &self.spec.program)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish()
    }
}

impl CompanionProcess {
    /// A companion that has not been launched yet.
    pub fn new(spec: CompanionSpec) -> Self {
        Self {
            spec,
            state: CompanionState::NotStarted,
            child: None,
            pid: None,
            lock_file: None,
        }
    }

    /// Launch the companion and wait until it reports liveness.
    pub async fn start(spec: CompanionSpec) -> Result<Self> {
        let mut companion = Self::new(spec);
        companion.launch().await?;
        Ok(companion)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> CompanionState {
        self.state
    }

    pub fn lock_file(&self) -> Option<&Path> {
        self.lock_file.as_deref()
    }

    async fn launch(&mut self) -> Result<()> {
        let lock_file = tempfile::Builder::new()
            .prefix("lingeredapp.")
            .suffix(".lck")
            .tempfile_in(&self.spec.lock_dir)
            .with_context(|| {
                format!(
                    "Failed to create companion lock file in {}",
                    self.spec.lock_dir.display()
                )
            })?
            .into_temp_path();
        let initial_mtime = modified(&lock_file)?;

        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .arg(lock_file.as_os_str())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(program = %self.spec.program.display(), args = ?self.spec.args, "Launching companion");
        let child = cmd.spawn().map_err(|e| {
            anyhow::Error::new(ProbeError::Startup(format!(
                "cannot execute {}: {e}",
                self.spec.program.display()
            )))
        })?;

        self.pid = child.id();
        self.child = Some(child);
        self.lock_file = Some(lock_file);
        self.state = CompanionState::Running;

        if let Err(e) = self.wait_ready(initial_mtime).await {
            self.stop().await.ok();
            return Err(e);
        }
        info!(pid = ?self.pid, "Companion ready");
        Ok(())
    }

    async fn wait_ready(&mut self, initial_mtime: SystemTime) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.spec.ready_timeout;
        loop {
            let child = self
                .child
                .as_mut()
                .context("companion child missing while waiting for readiness")?;
            if let Some(status) = child.try_wait().context("Failed to poll companion")? {
                return Err(ProbeError::Startup(format!(
                    "companion exited before becoming ready ({status})"
                ))
                .into());
            }

            if let Some(lock_file) = self.lock_file.as_deref() {
                if modified(lock_file).is_ok_and(|mtime| mtime != initial_mtime) {
                    return Ok(());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ProbeError::Startup(format!(
                    "companion did not touch its lock file within {}s",
                    self.spec.ready_timeout.as_secs()
                ))
                .into());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Stop the companion. A no-op when it never started or already stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != CompanionState::Running {
            return Ok(());
        }
        self.state = CompanionState::Stopped;

        if let Some(lock_file) = self.lock_file.take() {
            if let Err(e) = lock_file.close() {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove companion lock file: {e}");
                }
            }
        }

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.spec.stop_timeout, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for companion exit")?;
                debug!(pid = ?self.pid, %status, "Companion exited");
            }
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    "Companion ignored lock file removal for {}s, killing",
                    self.spec.stop_timeout.as_secs()
                );
                terminate_process_group(&mut child, KILL_GRACE).await;
                child.wait().await.context("Failed to reap companion")?;
            }
        }
        Ok(())
    }
}

impl Drop for CompanionProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                // SAFETY: kill() is async-signal-safe. Negative PID targets process group.
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            let _ = child.start_kill();
        }
        // `lock_file` (TempPath) removes itself on drop.
    }
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to stat {}", path.display()))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
