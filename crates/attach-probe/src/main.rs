use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod doctor;
mod harness;
mod heap_dump;
mod platform;
mod report;

use aprobe_config::{ProbeConfig, paths, validate_config};
use aprobe_core::OutputFormat;
use cli::{Cli, Commands, ConfigCommands, RunArgs};
use harness::{FailurePolicy, Step};
use platform::HostPlatform;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let format = cli.format.clone();
    let explicit_config = cli.config.as_deref();

    match cli.command {
        Commands::Run { args, keep_going } => {
            let config = load_config(explicit_config, &args, keep_going)?;
            let policy = if config.run.keep_going {
                FailurePolicy::KeepGoing
            } else {
                FailurePolicy::FailFast
            };
            let code =
                run_steps(&config, &args, &Step::default_sequence(), policy, &format).await?;
            std::process::exit(code);
        }
        Commands::Step { step, args } => {
            let config = load_config(explicit_config, &args, false)?;
            let code = run_steps(
                &config,
                &args,
                &[step.step()],
                FailurePolicy::FailFast,
                &format,
            )
            .await?;
            std::process::exit(code);
        }
        Commands::Doctor => {
            let config = ProbeConfig::load(explicit_config)?;
            doctor::run_doctor(&config, explicit_config, &format)?;
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => handle_config_show(explicit_config, &format)?,
            ConfigCommands::Init { project, force } => handle_config_init(project, force)?,
        },
    }

    Ok(())
}

/// File and env first, then CLI flags on top.
fn load_config(
    explicit: Option<&std::path::Path>,
    args: &RunArgs,
    keep_going: bool,
) -> Result<ProbeConfig> {
    let mut config = ProbeConfig::load(explicit)?;
    if let Some(jdk) = &args.jdk {
        config.tool.jdk = Some(jdk.clone());
    }
    if args.java_launcher {
        config.tool.use_java_launcher = true;
    }
    if let Some(secs) = args.timeout_secs {
        config.run.timeout_secs = secs;
    }
    if let Some(factor) = args.timeout_factor {
        config.run.timeout_factor = factor;
    }
    if let Some(dir) = &args.work_dir {
        config.run.work_dir = Some(dir.clone());
    }
    if args.keep_artifacts {
        config.run.keep_artifacts = true;
    }
    if keep_going {
        config.run.keep_going = true;
    }
    validate_config(&config)?;
    Ok(config)
}

async fn run_steps(
    config: &ProbeConfig,
    args: &RunArgs,
    steps: &[Step],
    policy: FailurePolicy,
    format: &OutputFormat,
) -> Result<i32> {
    let platform = if args.assume_attach {
        HostPlatform::assume_attach()
    } else {
        HostPlatform::detect()
    };
    tracing::debug!(?platform, ?policy, "Starting run");

    let report = harness::run_sequence(config, platform, steps, policy).await?;
    report.print(format)?;
    Ok(report.exit_code())
}

fn handle_config_show(explicit: Option<&std::path::Path>, format: &OutputFormat) -> Result<()> {
    let config = ProbeConfig::load(explicit)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

fn handle_config_init(project: bool, force: bool) -> Result<()> {
    let path = if project {
        std::env::current_dir()
            .context("Failed to read current directory")?
            .join(paths::PROJECT_CONFIG_FILE)
    } else {
        paths::user_config_path().context("Cannot determine user config directory")?
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, ProbeConfig::default_template())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Wrote configuration template to: {}", path.display());
    Ok(())
}
