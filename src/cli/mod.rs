//! CLI Module
//!
//! Provides command-line support shared by the binaries:
//! - Exit codes for automation
//! - Terminal/pipe detection and raw stdin access
//! - Device list output formats

pub mod exit_codes;
pub mod pipe;

pub use exit_codes::{CliResult, ExitCodes};
pub use pipe::{format_devices, raw_stdin, OutputFormat, PipeMode};
