//! Step runner.
//!
//! Every step owns a fresh companion: start it, point one tool invocation at
//! its pid, check the result, stop it. The companion is stopped on every exit
//! path before the step outcome is returned.

use anyhow::{Context, Result};
use aprobe_companion::{CompanionProcess, CompanionSpec};
use aprobe_config::ProbeConfig;
use aprobe_core::{ProbeError, StepOutcome, ToolMode};
use aprobe_launcher::{JAVA_BINARY, JdkTools, ToolInvocation, ToolLauncher};
use aprobe_process::{
    CaptureOptions, DEFAULT_TERMINATION_GRACE_PERIOD_SECS, ExecutionResult, StreamMode,
    run_and_capture,
};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::heap_dump::{Artifacts, DumpFile};
use crate::platform::{HostOs, HostPlatform};
use crate::report::{RunReport, StepReport};

const INTERACTIVE_INPUT: &str = "quit\n";
const HEAP_WRITTEN: &str = "heap written to";
const SKIP_OS_NOTICE: &str = "This test is not expected to work on OS X. Skipping";
const SKIP_OS_REASON: &str = "Coredump stackwalking is not implemented for Darwin";
pub const PERMISSION_DENIED_MESSAGE: &str = "Error! Insufficient permissions to attach.";

/// One unit of the probe sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// `clhsdb` fed `quit`; exit code only.
    Interactive,
    /// Tool run whose output must contain the mode's expected substring.
    Asserted(ToolMode),
    /// Like `Asserted`, skipped on hosts that cannot walk stacks.
    Skippable(ToolMode),
    /// `jmap --binaryheap --dumpfile=...` plus a check of the written file.
    HeapDump,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Interactive => ToolMode::Clhsdb.as_str(),
            Self::Asserted(mode) | Self::Skippable(mode) => mode.as_str(),
            Self::HeapDump => "heap-dump",
        }
    }

    /// The full probe: interactive shell, thread dump, heap summary,
    /// system properties, perf counters, binary heap dump.
    pub fn default_sequence() -> Vec<Step> {
        vec![
            Self::Interactive,
            Self::Skippable(ToolMode::Jstack),
            Self::Asserted(ToolMode::Jmap),
            Self::Asserted(ToolMode::Jinfo),
            Self::Asserted(ToolMode::Jsnap),
            Self::HeapDump,
        ]
    }

    /// The step a bare tool mode maps to in the default sequence.
    pub fn for_mode(mode: ToolMode) -> Step {
        match mode {
            ToolMode::Clhsdb => Self::Interactive,
            ToolMode::Jstack => Self::Skippable(mode),
            ToolMode::Jmap | ToolMode::Jinfo | ToolMode::Jsnap => Self::Asserted(mode),
        }
    }
}

/// What happens after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure; remaining steps are reported as not run.
    #[default]
    FailFast,
    /// Run every step and report all failures.
    KeepGoing,
}

/// Companion start options per step kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionLaunch {
    Default,
    BoundedHeap,
}

#[derive(Debug, Clone)]
pub struct CompanionSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub heap_option: String,
    pub classpath: Option<String>,
    pub lock_dir: PathBuf,
    pub ready_timeout: Duration,
    pub stop_timeout: Duration,
}

impl CompanionSettings {
    fn spec(&self, launch: CompanionLaunch) -> CompanionSpec {
        let mut args = Vec::with_capacity(self.args.len() + 3);
        if launch == CompanionLaunch::BoundedHeap {
            args.push(self.heap_option.clone());
        }
        if let Some(cp) = &self.classpath {
            args.push("-cp".to_string());
            args.push(cp.clone());
        }
        args.extend(self.args.iter().cloned());

        let mut spec = CompanionSpec::new(&self.program, args);
        spec.lock_dir = self.lock_dir.clone();
        spec.ready_timeout = self.ready_timeout;
        spec.stop_timeout = self.stop_timeout;
        spec
    }
}

#[derive(Debug, Clone)]
pub struct HarnessSettings {
    pub launcher: ToolLauncher,
    pub companion: CompanionSettings,
    pub platform: HostPlatform,
    pub tool_timeout: Duration,
    pub termination_grace: Duration,
    /// Where heap dumps are written.
    pub work_dir: PathBuf,
    pub keep_artifacts: bool,
}

#[derive(Debug, Clone)]
pub struct Harness {
    settings: HarnessSettings,
}

impl Harness {
    pub fn new(settings: HarnessSettings) -> Self {
        Self { settings }
    }

    /// Resolve tools and companion from `config`.
    ///
    /// The companion program defaults to the JDK's `java`.
    pub fn from_config(config: &ProbeConfig, platform: HostPlatform) -> Result<Self> {
        let tools = JdkTools::new(config.tool.jdk.clone());
        let launcher = ToolLauncher::from_config(&tools, &config.tool)?;
        let program = match &config.companion.program {
            Some(program) => program.clone(),
            None => tools.resolve(JAVA_BINARY)?,
        };
        let work_dir = match &config.run.work_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };

        Ok(Self::new(HarnessSettings {
            launcher,
            companion: CompanionSettings {
                program,
                args: config.companion.args.clone(),
                heap_option: config.companion.heap_option.clone(),
                classpath: config.companion.classpath.clone(),
                lock_dir: std::env::temp_dir(),
                ready_timeout: config.companion_ready_timeout(),
                stop_timeout: config.companion_stop_timeout(),
            },
            platform,
            tool_timeout: config.run.tool_timeout(),
            termination_grace: Duration::from_secs(DEFAULT_TERMINATION_GRACE_PERIOD_SECS),
            work_dir,
            keep_artifacts: config.run.keep_artifacts,
        }))
    }

    /// Run `steps` in order under `policy`.
    ///
    /// Step errors become `Failed` outcomes wrapped with the step name; the
    /// report never carries an `Err`. Heap dumps are released when this
    /// returns unless artifacts are kept.
    pub async fn run(&self, steps: &[Step], policy: FailurePolicy) -> RunReport {
        let mut report = RunReport::begin();
        let mut artifacts = Artifacts::default();

        for (idx, step) in steps.iter().enumerate() {
            info!(step = step.name(), "Running step");
            let started = Instant::now();
            let outcome = match self.run_step(*step, &mut artifacts).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let wrapped = ProbeError::step_failed(step.name(), format!("{e:#}"));
                    warn!("{wrapped}");
                    StepOutcome::Failed(wrapped.to_string())
                }
            };
            let failed = outcome.is_failure();
            report.push(StepReport::new(step.name(), outcome, started.elapsed()));

            if failed && policy == FailurePolicy::FailFast {
                report.mark_not_run(steps[idx + 1..].iter().map(Step::name));
                break;
            }
        }

        if self.settings.keep_artifacts {
            report.set_artifacts(artifacts.paths());
        }
        report.finish()
    }

    pub async fn run_step(&self, step: Step, artifacts: &mut Artifacts) -> Result<StepOutcome> {
        match step {
            Step::Interactive => self.run_interactive_step().await,
            Step::Asserted(mode) => {
                self.run_asserted_step(expected_for(mode)?, &[mode.as_str()])
                    .await
            }
            Step::Skippable(mode) => {
                self.run_skippable_step(expected_for(mode)?, &[mode.as_str()])
                    .await
            }
            Step::HeapDump => self.run_heap_dump_step(artifacts).await,
        }
    }

    /// `clhsdb` against a default companion, fed `quit`, exit code checked.
    pub async fn run_interactive_step(&self) -> Result<StepOutcome> {
        self.with_companion(CompanionLaunch::Default, |pid| async move {
            let invocation = self
                .settings
                .launcher
                .invocation(&[ToolMode::Clhsdb.as_str()], pid);
            let result = self
                .run_tool(&invocation, Some(INTERACTIVE_INPUT), StreamMode::EchoStdout)
                .await?;
            result.should_have_exit_value(invocation.tool_name(), 0)?;
            Ok(StepOutcome::Passed)
        })
        .await
    }

    /// `tool_args... --pid=<pid>` against a heap-bounded companion.
    pub async fn run_asserted_step<S: AsRef<str>>(
        &self,
        expected: &str,
        tool_args: &[S],
    ) -> Result<StepOutcome> {
        self.with_companion(CompanionLaunch::BoundedHeap, |pid| async move {
            let invocation = self.settings.launcher.invocation(tool_args, pid);
            let result = self
                .run_tool(&invocation, None, StreamMode::BufferOnly)
                .await?;
            let tool = invocation.tool_name();
            result.should_contain(tool, expected)?;
            result.should_have_exit_value(tool, 0)?;
            Ok(StepOutcome::Passed)
        })
        .await
    }

    /// [`run_asserted_step`](Self::run_asserted_step), except on macOS where
    /// nothing is launched.
    pub async fn run_skippable_step<S: AsRef<str>>(
        &self,
        expected: &str,
        tool_args: &[S],
    ) -> Result<StepOutcome> {
        if self.settings.platform.os == HostOs::MacOs {
            println!("{SKIP_OS_NOTICE}");
            return Ok(StepOutcome::Skipped(SKIP_OS_REASON.to_string()));
        }
        self.run_asserted_step(expected, tool_args).await
    }

    /// Binary heap dump into the work dir; the file must exist afterwards.
    ///
    /// The dump is handed to `artifacts` whatever the outcome so it is
    /// removed with the rest of the run's files.
    pub async fn run_heap_dump_step(&self, artifacts: &mut Artifacts) -> Result<StepOutcome> {
        let dump = DumpFile::prepare(&self.settings.work_dir, self.settings.keep_artifacts)?;
        let tool_args = [
            ToolMode::Jmap.as_str().to_string(),
            "--binaryheap".to_string(),
            dump.tool_arg(),
        ];
        let outcome = match self.run_asserted_step(HEAP_WRITTEN, &tool_args).await {
            Ok(outcome) => dump.verify().map(|()| outcome).map_err(anyhow::Error::new),
            Err(e) => Err(e),
        };
        if outcome.is_ok() {
            info!(path = %dump.path().display(), "Heap dump written");
        }
        artifacts.register(dump);
        outcome
    }

    async fn with_companion<F, Fut>(&self, launch: CompanionLaunch, body: F) -> Result<StepOutcome>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<StepOutcome>>,
    {
        println!("Starting LingeredApp");
        let mut companion = CompanionProcess::start(self.settings.companion.spec(launch)).await?;

        let outcome = match companion.pid() {
            Some(pid) => body(pid).await,
            None => Err(ProbeError::Startup("companion has no pid".to_string()).into()),
        };

        if let Err(e) = companion.stop().await {
            warn!("Failed to stop companion: {e:#}");
        }
        outcome
    }

    async fn run_tool(
        &self,
        invocation: &ToolInvocation,
        stdin: Option<&str>,
        stream_mode: StreamMode,
    ) -> Result<ExecutionResult> {
        info!(command = ?invocation.command_line(), "Launching tool");
        let options = CaptureOptions {
            stream_mode,
            timeout: Some(self.settings.tool_timeout),
            termination_grace: self.settings.termination_grace,
        };
        let result = run_and_capture(
            invocation.to_command(),
            stdin.map(|s| s.as_bytes().to_vec()),
            &options,
        )
        .await
        .with_context(|| format!("Failed to run {}", invocation.executable().display()))?;

        debug!(
            tool = invocation.tool_name(),
            exit_code = result.exit_code,
            summary = %result.summary,
            "Tool finished"
        );
        result.should_have_completed(
            invocation.tool_name(),
            self.settings.tool_timeout.as_secs(),
        )?;
        Ok(result)
    }
}

fn expected_for(mode: ToolMode) -> Result<&'static str> {
    mode.expected_output().ok_or_else(|| {
        anyhow::anyhow!("'{mode}' has no expected output and cannot be asserted")
    })
}

/// Gate on attach permission, then build a harness and run `steps`.
///
/// Without permission nothing is resolved or launched and the report is
/// `PermissionSkipped`.
pub async fn run_sequence(
    config: &ProbeConfig,
    platform: HostPlatform,
    steps: &[Step],
    policy: FailurePolicy,
) -> Result<RunReport> {
    if !platform.can_attach() {
        let reason = platform.attach.reason().unwrap_or_default().to_string();
        eprintln!("{PERMISSION_DENIED_MESSAGE}");
        info!(%reason, "Attach not permitted, no steps run");
        return Ok(RunReport::permission_skipped(reason));
    }
    let harness = Harness::from_config(config, platform)?;
    Ok(harness.run(steps, policy).await)
}

#[cfg(test)]
#[path = "harness_tests.rs"]
mod tests;
