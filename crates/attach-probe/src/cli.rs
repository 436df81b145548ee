use aprobe_core::{OutputFormat, ToolMode};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::harness::Step;

#[derive(Parser)]
#[command(name = "aprobe")]
#[command(about = "Attach-probe: run JVM serviceability tools against a live companion process")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./.aprobe.toml, then the user config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full probe sequence
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Run every step and report all failures instead of stopping at the first
        #[arg(long)]
        keep_going: bool,
    },

    /// Run a single step
    Step {
        #[arg(value_enum)]
        step: StepName,

        #[command(flatten)]
        args: RunArgs,
    },

    /// Check platform, attach permission and tool discovery
    Doctor,

    /// Show/initialize configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

/// Overrides shared by `run` and `step`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// JDK home containing bin/jhsdb
    #[arg(long)]
    pub jdk: Option<PathBuf>,

    /// Launch via `java sun.jvm.hotspot.SALauncher` instead of `jhsdb`
    #[arg(long)]
    pub java_launcher: bool,

    /// Per-tool timeout in seconds (before scaling)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Multiplier for every timeout
    #[arg(long)]
    pub timeout_factor: Option<f64>,

    /// Directory for heap dumps (defaults to CWD)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Keep heap dumps after the run
    #[arg(long)]
    pub keep_artifacts: bool,

    /// Skip the attach-permission probe
    #[arg(long)]
    pub assume_attach: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StepName {
    Clhsdb,
    Jstack,
    Jmap,
    Jinfo,
    Jsnap,
    HeapDump,
}

impl StepName {
    pub fn step(self) -> Step {
        match self {
            Self::Clhsdb => Step::for_mode(ToolMode::Clhsdb),
            Self::Jstack => Step::for_mode(ToolMode::Jstack),
            Self::Jmap => Step::for_mode(ToolMode::Jmap),
            Self::Jinfo => Step::for_mode(ToolMode::Jinfo),
            Self::Jsnap => Step::for_mode(ToolMode::Jsnap),
            Self::HeapDump => Step::HeapDump,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (file + env)
    Show,
    /// Write a commented config template
    Init {
        /// Write ./.aprobe.toml instead of the user config
        #[arg(long)]
        project: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "aprobe",
            "run",
            "--jdk",
            "/opt/jdk",
            "--keep-going",
            "--timeout-secs",
            "30",
            "--format",
            "json",
        ])
        .unwrap();

        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Run { args, keep_going } => {
                assert!(keep_going);
                assert_eq!(args.jdk, Some(PathBuf::from("/opt/jdk")));
                assert_eq!(args.timeout_secs, Some(30));
                assert!(!args.java_launcher);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_step_names_map_to_steps() {
        let cli = Cli::try_parse_from(["aprobe", "step", "heap-dump"]).unwrap();
        match cli.command {
            Commands::Step { step, .. } => assert_eq!(step.step(), Step::HeapDump),
            _ => panic!("expected step"),
        }
        assert_eq!(
            StepName::Jstack.step(),
            Step::Skippable(ToolMode::Jstack)
        );
        assert_eq!(StepName::Clhsdb.step(), Step::Interactive);
    }

    #[test]
    fn test_unknown_step_rejected() {
        assert!(Cli::try_parse_from(["aprobe", "step", "jcmd"]).is_err());
    }
}
