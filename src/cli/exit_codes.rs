//! CLI Exit Codes
//!
//! Exit codes for the binaries, and the mapping from errors to codes.

use std::process::ExitCode;

use crate::config::ConfigError;
use crate::core::hotplug::HotplugError;
use crate::core::session::SessionError;
use crate::core::state_machine::StateError;
use crate::utils::autoconnect::SupervisorError;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success (including operator-requested exit)
    pub const SUCCESS: u8 = 0;

    /// General error; also "no matching device" for find-port
    pub const ERROR: u8 = 1;

    /// Hot-plug notifications unavailable
    pub const HOTPLUG_UNAVAILABLE: u8 = 3;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Success without a message
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&anyhow::Error> for CliResult {
    fn from(err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(code_for)
            .unwrap_or(ExitCodes::ERROR);

        Self::Error(code, format!("{:#}", err))
    }
}

fn code_for(cause: &(dyn std::error::Error + 'static)) -> Option<u8> {
    if let Some(e) = cause.downcast_ref::<HotplugError>() {
        return Some(hotplug_code(e));
    }
    if let Some(e) = cause.downcast_ref::<SupervisorError>() {
        return match e {
            SupervisorError::Hotplug(e) | SupervisorError::Session(SessionError::Hotplug(e)) => {
                Some(hotplug_code(e))
            }
            SupervisorError::State(_) | SupervisorError::Session(SessionError::State(_)) => {
                Some(ExitCodes::INTERNAL_ERROR)
            }
            _ => None,
        };
    }
    if cause.is::<StateError>() {
        return Some(ExitCodes::INTERNAL_ERROR);
    }
    if cause.is::<ConfigError>() {
        return Some(ExitCodes::CONFIG_ERROR);
    }
    None
}

fn hotplug_code(e: &HotplugError) -> u8 {
    match e {
        HotplugError::Unavailable(_) => ExitCodes::HOTPLUG_UNAVAILABLE,
        _ => ExitCodes::ERROR,
    }
}
