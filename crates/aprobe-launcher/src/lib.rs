//! Locate JDK tools and build diagnostic tool command lines.

mod jdk;

use aprobe_config::ToolConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub use jdk::JdkTools;

/// Binary name of the diagnostic tool.
pub const TOOL_BINARY: &str = "jhsdb";
/// Runtime binary used by the java-launcher form.
pub const JAVA_BINARY: &str = "java";
/// Entry class the java-launcher form runs.
pub const SA_LAUNCHER_CLASS: &str = "sun.jvm.hotspot.SALauncher";

/// Which of the two equivalent command-line forms is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchForm {
    /// `{jdk}/bin/jhsdb [-J<vm-opt>...] <tool-args>`
    Direct,
    /// `{jdk}/bin/java [<vm-opt>...] sun.jvm.hotspot.SALauncher <tool-args>`
    JavaLauncher,
}

/// One fully built tool command line. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInvocation {
    executable: PathBuf,
    form: LaunchForm,
    args: Vec<String>,
    /// Index of the first tool argument (the subcommand) within `args`.
    #[serde(skip)]
    tool_args_start: usize,
}

impl ToolInvocation {
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn form(&self) -> LaunchForm {
        self.form
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Subcommand name (`clhsdb`, `jmap`, ...), used to label diagnostics.
    pub fn tool_name(&self) -> &str {
        self.args
            .get(self.tool_args_start)
            .map(String::as_str)
            .unwrap_or(TOOL_BINARY)
    }

    /// Executable followed by all arguments, for logging.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args);
        cmd
    }
}

/// Builder for [`ToolInvocation`]s against one resolved executable.
#[derive(Debug, Clone)]
pub struct ToolLauncher {
    executable: PathBuf,
    form: LaunchForm,
    vm_options: Vec<String>,
}

impl ToolLauncher {
    pub fn new(executable: impl Into<PathBuf>, form: LaunchForm) -> Self {
        Self {
            executable: executable.into(),
            form,
            vm_options: Vec::new(),
        }
    }

    /// Resolve the executable for `config` and carry its VM options.
    pub fn from_config(tools: &JdkTools, config: &ToolConfig) -> anyhow::Result<Self> {
        let form = if config.use_java_launcher {
            LaunchForm::JavaLauncher
        } else {
            LaunchForm::Direct
        };
        let binary = match form {
            LaunchForm::Direct => TOOL_BINARY,
            LaunchForm::JavaLauncher => JAVA_BINARY,
        };
        let mut launcher = Self::new(tools.resolve(binary)?, form);
        for option in &config.vm_options {
            launcher.add_vm_option(option);
        }
        Ok(launcher)
    }

    pub fn add_vm_option(&mut self, option: impl Into<String>) -> &mut Self {
        self.vm_options.push(option.into());
        self
    }

    pub fn form(&self) -> LaunchForm {
        self.form
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Build `tool_args... --pid=<pid>` for the configured form.
    pub fn invocation<S: AsRef<str>>(&self, tool_args: &[S], pid: u32) -> ToolInvocation {
        let mut args = Vec::with_capacity(self.vm_options.len() + tool_args.len() + 2);
        match self.form {
            LaunchForm::Direct => {
                args.extend(self.vm_options.iter().map(|opt| format!("-J{opt}")));
            }
            LaunchForm::JavaLauncher => {
                args.extend(self.vm_options.iter().cloned());
                args.push(SA_LAUNCHER_CLASS.to_string());
            }
        }
        let tool_args_start = args.len();
        args.extend(tool_args.iter().map(|a| a.as_ref().to_string()));
        args.push(format!("--pid={pid}"));

        tracing::debug!(form = ?self.form, ?args, "Built tool invocation");
        ToolInvocation {
            executable: self.executable.clone(),
            form: self.form,
            args,
            tool_args_start,
        }
    }
}
