//! Environment diagnostics: can this host run the probe?

use anyhow::Result;
use aprobe_config::{ProbeConfig, paths};
use aprobe_core::OutputFormat;
use aprobe_launcher::{JAVA_BINARY, JdkTools, TOOL_BINARY};
use serde::Serialize;
use std::path::PathBuf;

use crate::platform::{AttachCapability, HostPlatform};

#[derive(Debug, Serialize)]
struct DoctorReport {
    version: &'static str,
    platform: HostPlatform,
    jdk: Option<PathBuf>,
    jhsdb: Option<PathBuf>,
    java: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl DoctorReport {
    fn collect(config: &ProbeConfig, config_file: Option<PathBuf>) -> Self {
        let tools = JdkTools::new(config.tool.jdk.clone());
        Self {
            version: env!("CARGO_PKG_VERSION"),
            platform: HostPlatform::detect(),
            jdk: config.tool.jdk.clone(),
            jhsdb: tools.probe(TOOL_BINARY),
            java: tools.probe(JAVA_BINARY),
            config_file,
        }
    }
}

pub(crate) fn run_doctor(
    config: &ProbeConfig,
    explicit_config: Option<&std::path::Path>,
    format: &OutputFormat,
) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_file = paths::resolve_config_path(explicit_config, &cwd);
    let report = DoctorReport::collect(config, config_file);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &DoctorReport) {
    println!("=== attach-probe {} ===", report.version);
    println!(
        "Platform:  {} ({})",
        report.platform.os,
        std::env::consts::ARCH
    );
    match &report.platform.attach {
        AttachCapability::Allowed => println!("Attach:    allowed"),
        AttachCapability::Denied(reason) => println!("Attach:    DENIED ({reason})"),
    }
    println!();

    println!("=== Tools ===");
    match &report.jdk {
        Some(jdk) => println!("JDK:       {}", jdk.display()),
        None => println!("JDK:       (not set, using PATH)"),
    }
    print_tool(TOOL_BINARY, report.jhsdb.as_ref());
    print_tool(JAVA_BINARY, report.java.as_ref());
    println!();

    println!("=== Config ===");
    match &report.config_file {
        Some(path) => println!("File:      {}", path.display()),
        None => println!("File:      (none, using defaults)"),
    }
}

fn print_tool(name: &str, path: Option<&PathBuf>) {
    match path {
        Some(path) => println!("{name:<10} {}", path.display()),
        None => println!("{name:<10} NOT FOUND"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_reports_missing_tools_under_empty_jdk() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ProbeConfig::default();
        config.tool.jdk = Some(tmp.path().to_path_buf());

        let report = DoctorReport::collect(&config, None);
        assert!(report.jhsdb.is_none());
        assert!(report.java.is_none());
        assert_eq!(report.jdk.as_deref(), Some(tmp.path()));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["jhsdb"].is_null());
        assert!(json["platform"]["attach"]["status"].is_string());
    }
}
