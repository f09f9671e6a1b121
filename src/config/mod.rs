//! Configuration module
//!
//! Handles the optional settings file and its merge with the command line

mod settings;

pub use settings::{ConfigError, FileConfig, MonitorConfig, Overrides, DEFAULT_LOG_FILE};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "usb-ser-mon").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default settings file location
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
