use anyhow::Result;
use aprobe_core::ProbeError;
use std::path::{Path, PathBuf};

/// Resolves JDK binaries, either under a JDK home or from `PATH`.
#[derive(Debug, Clone, Default)]
pub struct JdkTools {
    jdk_home: Option<PathBuf>,
}

impl JdkTools {
    pub fn new(jdk_home: Option<PathBuf>) -> Self {
        Self { jdk_home }
    }

    pub fn jdk_home(&self) -> Option<&Path> {
        self.jdk_home.as_deref()
    }

    /// Path to `binary`: `{jdk}/bin/{binary}` when a JDK home is set, else
    /// the first match on `PATH`.
    pub fn resolve(&self, binary: &str) -> Result<PathBuf> {
        match &self.jdk_home {
            Some(home) => {
                let path = home
                    .join("bin")
                    .join(format!("{binary}{}", std::env::consts::EXE_SUFFIX));
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(ProbeError::ToolNotFound(path.display().to_string()).into())
                }
            }
            None => which::which(binary).map_err(|e| {
                tracing::debug!(binary, "PATH lookup failed: {e}");
                ProbeError::ToolNotFound(binary.to_string()).into()
            }),
        }
    }

    /// Like [`resolve`](Self::resolve) but never fails; for diagnostics output.
    pub fn probe(&self, binary: &str) -> Option<PathBuf> {
        self.resolve(binary).ok()
    }
}
