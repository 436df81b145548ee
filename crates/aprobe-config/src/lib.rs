pub mod config;
pub mod paths;
pub mod validate;

pub use config::{CompanionConfig, ProbeConfig, RunConfig, ToolConfig};
pub use validate::validate_config;
