//! # usb-ser-mon core library
//!
//! A serial monitor for USB serial devices that survives unplug and replug:
//! - Hot-plug detection through udev
//! - Device matching by path, vendor, serial number, interface and USB ids
//! - Raw terminal mode, restored on every exit path
//! - Timestamped session transcript
//! - A single-threaded `poll(2)` session loop
//! - A supervisor that waits for the device, connects, and reconnects
//!
//! ## Example
//!
//! ```rust,no_run
//! use usb_ser_mon_core::core::hotplug::{HotplugWatcher, UdevEnumerator, TTY_SUBSYSTEM};
//! use usb_ser_mon_core::{
//!     AutoConnectConfig, ConnectionSupervisor, OperatorInput, SerialConnector, SessionLogger,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let hotplug = HotplugWatcher::subscribe(TTY_SUBSYSTEM)?;
//!     let input = OperatorInput::new(usb_ser_mon_core::cli::raw_stdin()?, true);
//!     let logger = SessionLogger::create(std::io::stdout(), "session.log".as_ref())?;
//!
//!     let mut supervisor = ConnectionSupervisor::new(
//!         AutoConnectConfig::default(),
//!         SerialConnector,
//!         hotplug,
//!         input,
//!         logger,
//!     );
//!     supervisor.run(&UdevEnumerator::new(TTY_SUBSYSTEM))?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[cfg(not(target_os = "linux"))]
compile_error!("usb-ser-mon relies on udev and only builds on Linux");

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat, PipeMode};
pub use crate::config::{FileConfig, MonitorConfig, Overrides};
pub use crate::core::device::{DeviceDescriptor, DeviceSummary, HotplugAction};
pub use crate::core::logger::SessionLogger;
pub use crate::core::matcher::{matches, MatchCriteria, SerialFilter};
pub use crate::core::session::{ExitSignal, OperatorInput, SessionOptions, SessionOutcome};
pub use crate::core::state_machine::{DisconnectReason, SessionState};
pub use crate::core::terminal::RawModeGuard;
pub use crate::core::transport::{Connector, SerialConnector, SerialSettings};
pub use crate::utils::autoconnect::{AutoConnectConfig, ConnectionSupervisor, Shutdown};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
