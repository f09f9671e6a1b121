//! USB hot-plug detection
//!
//! The supervisor only needs two things from the OS: a list of the tty
//! devices present right now, and a readiness-signalled stream of add/remove
//! notifications. Both sit behind small traits so the lifecycle logic can be
//! driven by synthetic events in tests; the udev-backed implementations are
//! Linux only.

use std::os::fd::AsFd;
use thiserror::Error;

use super::device::DeviceDescriptor;

/// Subsystem carrying serial device nodes
pub const TTY_SUBSYSTEM: &str = "tty";

/// Hot-plug errors
#[derive(Error, Debug)]
pub enum HotplugError {
    /// Device notification service could not be reached
    #[error("device notification service unavailable: {0}")]
    Unavailable(#[source] std::io::Error),

    /// Enumerating present devices failed
    #[error("failed to enumerate {subsystem} devices: {source}")]
    Enumeration {
        /// Subsystem being enumerated
        subsystem: String,
        /// Underlying udev error
        #[source]
        source: std::io::Error,
    },

    /// Receiving an event failed
    #[error("failed to receive device event: {0}")]
    Receive(#[source] std::io::Error),
}

/// Readiness-signalled source of device events
///
/// The descriptor returned by [`HotplugSource::poll_event`] carries the
/// event's action. The source itself filters only by subsystem.
pub trait HotplugSource: AsFd {
    /// Take one queued event; `None` when the wakeup had nothing for us
    fn poll_event(&mut self) -> Result<Option<DeviceDescriptor>, HotplugError>;
}

/// Snapshot of the devices present right now
pub trait DeviceEnumerator {
    /// List devices of the configured subsystem
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, HotplugError>;
}

#[cfg(target_os = "linux")]
pub use self::linux::{HotplugWatcher, UdevEnumerator};

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::OsStr;
    use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
    use tracing::{debug, info};

    use super::{DeviceEnumerator, HotplugError, HotplugSource};
    use crate::core::device::{DeviceDescriptor, HotplugAction};

    fn property(device: &udev::Device, key: &str) -> Option<String> {
        device
            .property_value(key)
            .map(OsStr::to_string_lossy)
            .map(|value| value.into_owned())
    }

    /// Build a descriptor from a udev device; devices without a node are skipped
    fn descriptor(device: &udev::Device, action: HotplugAction) -> Option<DeviceDescriptor> {
        let path = device.devnode()?.to_string_lossy().into_owned();

        Some(DeviceDescriptor {
            path,
            vendor_id: property(device, "ID_VENDOR_ID"),
            product_id: property(device, "ID_MODEL_ID"),
            vendor_name: property(device, "ID_VENDOR"),
            serial_number: property(device, "ID_SERIAL_SHORT"),
            interface_number: property(device, "ID_USB_INTERFACE_NUM"),
            action,
        })
    }

    /// udev monitor subscribed to one subsystem
    pub struct HotplugWatcher {
        socket: udev::MonitorSocket,
    }

    impl HotplugWatcher {
        /// Subscribe to add/remove notifications for `subsystem`
        pub fn subscribe(subsystem: &str) -> Result<Self, HotplugError> {
            let socket = udev::MonitorBuilder::new()
                .and_then(|builder| builder.match_subsystem(subsystem))
                .and_then(|builder| builder.listen())
                .map_err(HotplugError::Unavailable)?;

            info!("Subscribed to {} hot-plug events", subsystem);
            Ok(Self { socket })
        }
    }

    impl AsFd for HotplugWatcher {
        fn as_fd(&self) -> BorrowedFd<'_> {
            // SAFETY: the monitor socket owns the descriptor for as long as `self` lives
            unsafe { BorrowedFd::borrow_raw(self.socket.as_raw_fd()) }
        }
    }

    impl HotplugSource for HotplugWatcher {
        fn poll_event(&mut self) -> Result<Option<DeviceDescriptor>, HotplugError> {
            let Some(event) = self.socket.iter().next() else {
                return Ok(None);
            };

            let action = event
                .action()
                .map(OsStr::to_string_lossy)
                .unwrap_or_default();
            let descriptor = descriptor(&event, HotplugAction::from_udev(&action));

            if let Some(ref d) = descriptor {
                debug!("udev {} {}", d.action, d.path);
            }
            Ok(descriptor)
        }
    }

    /// Scans udev for present devices of one subsystem
    pub struct UdevEnumerator {
        subsystem: String,
    }

    impl UdevEnumerator {
        /// Create an enumerator for `subsystem`
        pub fn new(subsystem: &str) -> Self {
            Self {
                subsystem: subsystem.to_string(),
            }
        }
    }

    impl DeviceEnumerator for UdevEnumerator {
        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, HotplugError> {
            let to_error = |source| HotplugError::Enumeration {
                subsystem: self.subsystem.clone(),
                source,
            };

            let mut enumerator = udev::Enumerator::new().map_err(to_error)?;
            enumerator
                .match_subsystem(&self.subsystem)
                .map_err(to_error)?;

            let devices: Vec<_> = enumerator
                .scan_devices()
                .map_err(to_error)?
                .filter_map(|device| descriptor(&device, HotplugAction::Other))
                .collect();

            debug!("Enumerated {} {} device(s)", devices.len(), self.subsystem);
            Ok(devices)
        }
    }
}

/// Devices currently present that match, in enumeration order
pub fn present_matches<E: DeviceEnumerator>(
    enumerator: &E,
    criteria: &super::matcher::MatchCriteria,
) -> Result<Vec<DeviceDescriptor>, HotplugError> {
    Ok(enumerator
        .enumerate()?
        .into_iter()
        .filter(|device| super::matcher::matches(device, criteria))
        .collect())
}
