use anyhow::{Result, bail};

use crate::config::{MAX_SCALED_TIMEOUT_SECS, ProbeConfig};

/// Reject configurations that would make every step fail or hang.
pub fn validate_config(config: &ProbeConfig) -> Result<()> {
    if config.run.timeout_secs == 0 {
        bail!("run.timeout_secs must be > 0 (got 0)");
    }
    if !config.run.timeout_factor.is_finite() || config.run.timeout_factor <= 0.0 {
        bail!(
            "run.timeout_factor must be a positive number (got {})",
            config.run.timeout_factor
        );
    }
    if config.companion.ready_timeout_secs == 0 {
        bail!("companion.ready_timeout_secs must be > 0 (got 0)");
    }
    if config.companion.stop_timeout_secs == 0 {
        bail!("companion.stop_timeout_secs must be > 0 (got 0)");
    }
    for (key, secs) in [
        ("run.timeout_secs", config.run.timeout_secs),
        ("companion.ready_timeout_secs", config.companion.ready_timeout_secs),
        ("companion.stop_timeout_secs", config.companion.stop_timeout_secs),
    ] {
        let scaled = secs as f64 * config.run.timeout_factor;
        if scaled > MAX_SCALED_TIMEOUT_SECS as f64 {
            bail!(
                "{key} scaled by run.timeout_factor is {scaled}s, above the {MAX_SCALED_TIMEOUT_SECS}s limit"
            );
        }
    }
    if config.companion.heap_option.trim().is_empty() {
        bail!("companion.heap_option cannot be empty");
    }
    if config.companion.program.is_none() && config.companion.args.is_empty() {
        bail!("companion.args cannot be empty when companion.program is unset");
    }
    Ok(())
}
