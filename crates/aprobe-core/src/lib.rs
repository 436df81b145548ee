//! Shared types and the error taxonomy for the attach-probe workspace.

pub mod error;
pub mod types;

pub use error::ProbeError;
pub use types::{OutputFormat, StepOutcome, ToolMode};
