//! Monitor settings

use crate::core::matcher::{MatchCriteria, SerialFilter};
use crate::core::session::{ExitSignal, SessionOptions};
use crate::core::transport::SerialSettings;
use crate::utils::autoconnect::AutoConnectConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Transcript file used when none is configured
pub const DEFAULT_LOG_FILE: &str = "usb-ser-mon.log";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file exists but could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Settings file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for this tool
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Settings file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Exit character is not a control-key letter
    #[error("Invalid exit character '{0}' (expected a letter such as X or Y)")]
    InvalidExitChar(String),

    /// Baud rate of zero
    #[error("Invalid baud rate: {0}")]
    InvalidBaud(u32),
}

/// Contents of the settings file; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Baud rate
    pub baud: Option<u32>,
    /// Transcript file
    pub log_file: Option<PathBuf>,
    /// Local echo
    pub echo: Option<bool>,
    /// Exit key letter ("X" or "Y")
    pub exit_char: Option<String>,
    /// Vendor name prefix
    pub vendor: Option<String>,
    /// Exact serial number
    pub serial: Option<String>,
    /// Device path substring
    pub port: Option<String>,
    /// USB interface number
    pub interface: Option<String>,
    /// Delay after each byte sent, in milliseconds
    pub tx_pace_ms: Option<u64>,
}

impl FileConfig {
    /// Load a settings file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the default location, if there is one
    pub fn load_default() -> Result<Self, ConfigError> {
        match super::default_config_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Baud rate
    pub baud: Option<u32>,
    /// Device path substring
    pub port: Option<String>,
    /// Vendor name prefix
    pub vendor: Option<String>,
    /// Exact serial number
    pub serial: Option<String>,
    /// USB interface number
    pub interface: Option<String>,
    /// Force local echo on
    pub echo: bool,
    /// Per-byte trace lines
    pub debug: bool,
    /// Exit with Control-Y instead of Control-X
    pub ctrl_y_exit: bool,
    /// Transcript file
    pub log_file: Option<PathBuf>,
    /// Disable the transcript
    pub no_log: bool,
}

/// Merged, validated monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Which devices to connect to
    pub criteria: MatchCriteria,
    /// Line settings
    pub serial: SerialSettings,
    /// Session behavior
    pub session: SessionOptions,
    /// Transcript file, `None` when logging is off
    pub log_file: Option<PathBuf>,
}

impl MonitorConfig {
    /// Merge file values with command-line values; the command line wins
    pub fn merge(file: FileConfig, cli: Overrides) -> Result<Self, ConfigError> {
        let baud = cli.baud.or(file.baud).unwrap_or(SerialSettings::default().baud_rate);
        if baud == 0 {
            return Err(ConfigError::InvalidBaud(baud));
        }

        let exit_signal = match (cli.ctrl_y_exit, file.exit_char.as_deref()) {
            (true, _) => ExitSignal::control('Y'),
            (false, None) => Some(ExitSignal::default()),
            (false, Some(text)) => parse_exit_char(text),
        }
        .ok_or_else(|| ConfigError::InvalidExitChar(file.exit_char.clone().unwrap_or_default()))?;

        let defaults = SessionOptions::default();
        let session = SessionOptions {
            exit_signal,
            echo: cli.echo || file.echo.unwrap_or(false),
            debug: cli.debug,
            tx_pace: file.tx_pace_ms.map_or(defaults.tx_pace, Duration::from_millis),
            ..defaults
        };

        let criteria = MatchCriteria {
            path_contains: cli.port.or(file.port),
            vendor_prefix: cli.vendor.or(file.vendor),
            serial: cli.serial.or(file.serial).map(SerialFilter::Exact),
            interface_number: cli.interface.or(file.interface),
            ..MatchCriteria::default()
        };

        let log_file = if cli.no_log {
            None
        } else {
            Some(
                cli.log_file
                    .or(file.log_file)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            )
        };

        Ok(Self {
            criteria,
            serial: SerialSettings::new(baud),
            session,
            log_file,
        })
    }

    /// Supervisor configuration
    pub fn autoconnect(&self) -> AutoConnectConfig {
        AutoConnectConfig {
            criteria: self.criteria.clone(),
            serial: self.serial,
            session: self.session.clone(),
        }
    }
}

fn parse_exit_char(text: &str) -> Option<ExitSignal> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => ExitSignal::control(c),
        _ => None,
    }
}
