//! Probe configuration (`.aprobe.toml` or `~/.config/attach-probe/config.toml`).
//!
//! Three sections:
//! - `[tool]`: where the diagnostic tool lives and how it is launched
//! - `[companion]`: how the target process is started and stopped
//! - `[run]`: timeouts, failure policy and artifact handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Env var that overrides `tool.jdk` unconditionally.
pub const JDK_ENV: &str = "APROBE_JDK";
/// Fallback JDK env vars, consulted in order when `tool.jdk` is unset.
pub const JDK_FALLBACK_ENVS: &[&str] = &["TEST_JDK", "JAVA_HOME"];
/// Env var that overrides `run.timeout_factor`.
pub const TIMEOUT_FACTOR_ENV: &str = "APROBE_TIMEOUT_FACTOR";

const DEFAULT_COMPANION_MAIN: &str = "jdk.test.lib.apps.LingeredApp";
const DEFAULT_HEAP_OPTION: &str = "-Xmx256m";
const DEFAULT_READY_TIMEOUT_SECS: u64 = 100;
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;
/// Upper bound for any timeout after scaling (one week).
pub const MAX_SCALED_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub companion: CompanionConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Diagnostic tool location and launch form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// JDK home containing `bin/jhsdb` and `bin/java`. None = env or PATH.
    #[serde(default)]
    pub jdk: Option<PathBuf>,
    /// Launch via `java sun.jvm.hotspot.SALauncher` instead of `jhsdb`,
    /// which lets extra VM options reach the tool's own VM.
    #[serde(default)]
    pub use_java_launcher: bool,
    /// VM options forwarded to the tool's VM.
    #[serde(default)]
    pub vm_options: Vec<String>,
}

/// Companion (target) process launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Executable. None = `{jdk}/bin/java`.
    #[serde(default)]
    pub program: Option<PathBuf>,
    /// Arguments placed before the lock file path.
    #[serde(default = "default_companion_args")]
    pub args: Vec<String>,
    /// Heap bound used by the asserted steps.
    #[serde(default = "default_heap_option")]
    pub heap_option: String,
    /// Optional `-cp` value prepended to the arguments.
    #[serde(default)]
    pub classpath: Option<String>,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: default_companion_args(),
            heap_option: default_heap_option(),
            classpath: None,
            ready_timeout_secs: DEFAULT_READY_TIMEOUT_SECS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

impl CompanionConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Run-wide policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Wall-clock limit for one tool invocation, before scaling.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Multiplier applied to every timeout (slow CI hosts).
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f64,
    /// Run every step and report all failures instead of stopping at the first.
    #[serde(default)]
    pub keep_going: bool,
    /// Directory for heap dumps. None = current directory.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Leave heap dumps on disk after the run.
    #[serde(default)]
    pub keep_artifacts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            timeout_factor: default_timeout_factor(),
            keep_going: false,
            work_dir: None,
            keep_artifacts: false,
        }
    }
}

impl RunConfig {
    /// Tool timeout after applying `timeout_factor`.
    pub fn tool_timeout(&self) -> Duration {
        scale(Duration::from_secs(self.timeout_secs), self.timeout_factor)
    }
}

/// `base * factor`, saturating at [`MAX_SCALED_TIMEOUT_SECS`].
fn scale(base: Duration, factor: f64) -> Duration {
    let max = Duration::from_secs(MAX_SCALED_TIMEOUT_SECS);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor)
        .map_or(max, |scaled| scaled.min(max))
}

fn default_companion_args() -> Vec<String> {
    vec![DEFAULT_COMPANION_MAIN.to_string()]
}

fn default_heap_option() -> String {
    DEFAULT_HEAP_OPTION.to_string()
}

fn default_ready_timeout_secs() -> u64 {
    DEFAULT_READY_TIMEOUT_SECS
}

fn default_stop_timeout_secs() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

fn default_timeout_factor() -> f64 {
    1.0
}

impl ProbeConfig {
    /// Load config using the standard lookup order, then apply env overrides.
    ///
    /// Returns defaults (plus env) when no config file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let mut config = match paths::resolve_config_path(explicit, &cwd) {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file without env overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded probe config");
        Ok(config)
    }

    /// Apply env overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(jdk) = non_empty(JDK_ENV) {
            self.tool.jdk = Some(PathBuf::from(jdk));
        } else if self.tool.jdk.is_none() {
            self.tool.jdk = JDK_FALLBACK_ENVS
                .iter()
                .find_map(|key| non_empty(key))
                .map(PathBuf::from);
        }

        if let Some(raw) = non_empty(TIMEOUT_FACTOR_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(factor) => self.run.timeout_factor = factor,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring unparsable {TIMEOUT_FACTOR_ENV}"
                ),
            }
        }
    }

    /// Companion timeouts scaled by `run.timeout_factor`.
    pub fn companion_ready_timeout(&self) -> Duration {
        scale(self.companion.ready_timeout(), self.run.timeout_factor)
    }

    pub fn companion_stop_timeout(&self) -> Duration {
        scale(self.companion.stop_timeout(), self.run.timeout_factor)
    }

    /// Commented template for `aprobe config init`.
    pub fn default_template() -> String {
        r#"# attach-probe configuration
# Location: ./.aprobe.toml or ~/.config/attach-probe/config.toml

[tool]
# jdk = "/usr/lib/jvm/jdk"       # falls back to APROBE_JDK, TEST_JDK, JAVA_HOME, PATH
use_java_launcher = false
vm_options = []

[companion]
# program = "/usr/lib/jvm/jdk/bin/java"
args = ["jdk.test.lib.apps.LingeredApp"]
heap_option = "-Xmx256m"
# classpath = "/path/to/test/classes"
ready_timeout_secs = 100
stop_timeout_secs = 10

[run]
timeout_secs = 120
timeout_factor = 1.0
keep_going = false
keep_artifacts = false
"#
        .to_string()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
