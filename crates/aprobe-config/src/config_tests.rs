use super::*;
use serial_test::serial;
use std::collections::HashMap;

fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config() {
    let config = ProbeConfig::default();
    assert!(config.tool.jdk.is_none());
    assert!(!config.tool.use_java_launcher);
    assert_eq!(config.companion.heap_option, "-Xmx256m");
    assert_eq!(config.companion.args, vec!["jdk.test.lib.apps.LingeredApp"]);
    assert_eq!(config.run.timeout_secs, 120);
    assert!(!config.run.keep_going);
    assert_eq!(config.run.tool_timeout(), Duration::from_secs(120));
}

#[test]
fn test_parse_partial_toml_fills_defaults() {
    let config: ProbeConfig = toml::from_str(
        r#"
[tool]
jdk = "/opt/jdk"
use_java_launcher = true

[run]
timeout_factor = 2.5
"#,
    )
    .unwrap();

    assert_eq!(config.tool.jdk, Some(PathBuf::from("/opt/jdk")));
    assert!(config.tool.use_java_launcher);
    assert_eq!(config.companion.stop_timeout_secs, 10);
    assert_eq!(config.run.tool_timeout(), Duration::from_secs(300));
}

#[test]
fn test_companion_timeouts_are_scaled() {
    let mut config = ProbeConfig::default();
    config.run.timeout_factor = 2.0;
    config.companion.ready_timeout_secs = 5;
    config.companion.stop_timeout_secs = 3;
    assert_eq!(config.companion_ready_timeout(), Duration::from_secs(10));
    assert_eq!(config.companion_stop_timeout(), Duration::from_secs(6));
}

#[test]
fn test_overflowing_scale_saturates() {
    let max = Duration::from_secs(MAX_SCALED_TIMEOUT_SECS);
    let mut config = ProbeConfig::default();
    config.run.timeout_secs = u64::MAX;
    assert_eq!(config.run.tool_timeout(), max);

    config.run.timeout_secs = 120;
    config.run.timeout_factor = 1e300;
    assert_eq!(config.run.tool_timeout(), max);
    assert_eq!(config.companion_ready_timeout(), max);
}

#[test]
fn test_env_jdk_override_beats_config() {
    let mut config = ProbeConfig::default();
    config.tool.jdk = Some(PathBuf::from("/from/config"));
    config.apply_env_overrides(lookup_from(&[
        ("APROBE_JDK", "/from/env"),
        ("JAVA_HOME", "/from/java-home"),
    ]));
    assert_eq!(config.tool.jdk, Some(PathBuf::from("/from/env")));
}

#[test]
fn test_fallback_envs_only_fill_missing_jdk() {
    let mut config = ProbeConfig::default();
    config.tool.jdk = Some(PathBuf::from("/from/config"));
    config.apply_env_overrides(lookup_from(&[("JAVA_HOME", "/from/java-home")]));
    assert_eq!(config.tool.jdk, Some(PathBuf::from("/from/config")));

    let mut config = ProbeConfig::default();
    config.apply_env_overrides(lookup_from(&[
        ("TEST_JDK", "/from/test-jdk"),
        ("JAVA_HOME", "/from/java-home"),
    ]));
    assert_eq!(config.tool.jdk, Some(PathBuf::from("/from/test-jdk")));
}

#[test]
fn test_empty_env_values_are_ignored() {
    let mut config = ProbeConfig::default();
    config.apply_env_overrides(lookup_from(&[("APROBE_JDK", "  "), ("JAVA_HOME", "/jh")]));
    assert_eq!(config.tool.jdk, Some(PathBuf::from("/jh")));
}

#[test]
fn test_timeout_factor_env() {
    let mut config = ProbeConfig::default();
    config.apply_env_overrides(lookup_from(&[("APROBE_TIMEOUT_FACTOR", "4")]));
    assert_eq!(config.run.timeout_factor, 4.0);

    config.apply_env_overrides(lookup_from(&[("APROBE_TIMEOUT_FACTOR", "fast")]));
    assert_eq!(config.run.timeout_factor, 4.0, "garbage keeps previous value");
}

#[test]
fn test_load_from_path_reports_parse_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.toml");
    std::fs::write(&path, "[run\ntimeout_secs = ").unwrap();

    let err = ProbeConfig::load_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
}

#[test]
fn test_default_template_parses() {
    let config: ProbeConfig = toml::from_str(&ProbeConfig::default_template()).unwrap();
    assert_eq!(config.run.timeout_secs, 120);
    assert_eq!(config.companion.ready_timeout_secs, 100);
}

#[test]
#[serial]
fn test_load_explicit_path_applies_process_env() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("probe.toml");
    std::fs::write(&path, "[run]\ntimeout_secs = 7\n").unwrap();

    let original = std::env::var(TIMEOUT_FACTOR_ENV).ok();
    // SAFETY: serialized test; the original value is restored below.
    unsafe { std::env::set_var(TIMEOUT_FACTOR_ENV, "3") };

    let loaded = ProbeConfig::load(Some(&path));

    // SAFETY: same serialized context as above.
    unsafe {
        match original {
            Some(v) => std::env::set_var(TIMEOUT_FACTOR_ENV, v),
            None => std::env::remove_var(TIMEOUT_FACTOR_ENV),
        }
    }

    let config = loaded.unwrap();
    assert_eq!(config.run.timeout_secs, 7);
    assert_eq!(config.run.tool_timeout(), Duration::from_secs(21));
}
