//! Heap dump artifact: unique path, stale-file removal, scoped deletion.

use anyhow::{Context, Result};
use aprobe_core::ProbeError;
use std::path::{Path, PathBuf};

const DUMP_PREFIX: &str = "jhsdb.jmap.dump.";
const DUMP_SUFFIX: &str = ".hprof";

/// A heap dump path owned by the run. Deleted on drop unless kept.
#[derive(Debug)]
pub struct DumpFile {
    path: PathBuf,
    keep: bool,
}

impl DumpFile {
    /// Reserve `{dir}/jhsdb.jmap.dump.<epoch-millis>.hprof`, removing any
    /// stale file already at that path.
    pub fn prepare(dir: &Path, keep: bool) -> Result<Self> {
        let millis = chrono::Utc::now().timestamp_millis();
        let dir = std::path::absolute(dir)
            .with_context(|| format!("Failed to resolve dump directory {}", dir.display()))?;
        Self::claim(dir.join(format!("{DUMP_PREFIX}{millis}{DUMP_SUFFIX}")), keep)
    }

    fn claim(path: PathBuf, keep: bool) -> Result<Self> {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale dump file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove stale dump {}", path.display()));
            }
        }
        Ok(Self { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `--dumpfile=<absolute path>` tool argument.
    pub fn tool_arg(&self) -> String {
        format!("--dumpfile={}", self.path.display())
    }

    /// The dump must exist and be a regular file.
    pub fn verify(&self) -> Result<(), ProbeError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(ProbeError::Artifact(self.path.display().to_string())),
        }
    }
}

impl Drop for DumpFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed dump file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), "Failed to remove dump file: {e}"),
        }
    }
}

/// Artifacts produced during one run; all released when the run ends.
#[derive(Debug, Default)]
pub struct Artifacts {
    dumps: Vec<DumpFile>,
}

impl Artifacts {
    pub fn register(&mut self, dump: DumpFile) {
        self.dumps.push(dump);
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.dumps.iter().map(|d| d.path.clone()).collect()
    }
}
