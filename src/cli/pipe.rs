//! CLI Pipe Support
//!
//! Detects whether the standard streams are terminals, gives the monitor an
//! unbuffered handle on stdin, and formats device lists for scripts.

use std::fs::File;
use std::io;
use std::os::fd::AsFd;

use crate::core::device::{DeviceDescriptor, DeviceSummary};

/// Pipe mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
    /// No piping, interactive mode
    Interactive,
    /// Read from stdin
    StdinOnly,
    /// Write to stdout
    StdoutOnly,
    /// Full pipe mode (stdin -> process -> stdout)
    Full,
}

impl PipeMode {
    /// Detect pipe mode from environment
    pub fn detect() -> Self {
        Self::from_terminals(atty::is(atty::Stream::Stdin), atty::is(atty::Stream::Stdout))
    }

    /// Pipe mode for the given terminal flags
    pub fn from_terminals(stdin_is_tty: bool, stdout_is_tty: bool) -> Self {
        match (stdin_is_tty, stdout_is_tty) {
            (true, true) => Self::Interactive,
            (false, true) => Self::StdinOnly,
            (true, false) => Self::StdoutOnly,
            (false, false) => Self::Full,
        }
    }

    /// Is receiving from stdin?
    pub fn has_stdin(&self) -> bool {
        matches!(self, Self::StdinOnly | Self::Full)
    }

    /// Is stdin a terminal (raw mode applies)?
    pub fn stdin_is_terminal(&self) -> bool {
        !self.has_stdin()
    }
}

/// Unbuffered handle on stdin
///
/// Reads go straight to the descriptor, so nothing is held back in a
/// user-space buffer where `poll(2)` cannot see it.
pub fn raw_stdin() -> io::Result<File> {
    let fd = io::stdin().as_fd().try_clone_to_owned()?;
    Ok(File::from(fd))
}

/// Device list output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Path of the first device only
    Path,
    /// One descriptive line per device
    List,
    /// JSON array of descriptors
    Json,
}

/// Format matching devices; `Path` with no devices yields an empty string
pub fn format_devices(devices: &[DeviceDescriptor], format: OutputFormat) -> serde_json::Result<String> {
    Ok(match format {
        OutputFormat::Path => devices
            .first()
            .map(|d| format!("{}\n", d.path))
            .unwrap_or_default(),
        OutputFormat::List if devices.is_empty() => "No USB Serial devices detected.\n".to_string(),
        OutputFormat::List => devices
            .iter()
            .map(|d| {
                format!(
                    "USB Serial Device {}{} found @{}\n",
                    d.usb_id_label(),
                    DeviceSummary::Connected(d).extra_info(),
                    d.path
                )
            })
            .collect(),
        OutputFormat::Json => serde_json::to_string_pretty(devices)? + "\n",
    })
}
