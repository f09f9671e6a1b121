//! USB serial device snapshots
//!
//! A [`DeviceDescriptor`] is produced by the hotplug monitor or by
//! enumeration and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::matcher::{MatchCriteria, SerialFilter};

/// What the hotplug subsystem reported for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HotplugAction {
    /// Device node appeared
    Added,
    /// Device node went away
    Removed,
    /// Anything else (change, bind, enumeration snapshot)
    #[default]
    Other,
}

impl HotplugAction {
    /// Map a udev action string ("add", "remove", ...) to an action
    pub fn from_udev(action: &str) -> Self {
        match action {
            "add" => Self::Added,
            "remove" => Self::Removed,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for HotplugAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "add"),
            Self::Removed => write!(f, "remove"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Immutable snapshot of a tty device and its USB properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device node (e.g. /dev/ttyACM0)
    pub path: String,
    /// USB vendor id as reported by udev (`ID_VENDOR_ID`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    /// USB product id (`ID_MODEL_ID`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Vendor name (`ID_VENDOR`); absent for non-USB ttys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    /// Short serial number (`ID_SERIAL_SHORT`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// USB interface number (`ID_USB_INTERFACE_NUM`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_number: Option<String>,
    /// Hotplug action that produced this snapshot
    #[serde(default)]
    pub action: HotplugAction,
}

impl DeviceDescriptor {
    /// Create a descriptor for a device node with no USB properties
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            vendor_id: None,
            product_id: None,
            vendor_name: None,
            serial_number: None,
            interface_number: None,
            action: HotplugAction::Other,
        }
    }

    /// Set vendor name
    #[must_use]
    pub fn vendor_name(mut self, name: impl Into<String>) -> Self {
        self.vendor_name = Some(name.into());
        self
    }

    /// Set vendor and product ids
    #[must_use]
    pub fn usb_id(mut self, vid: impl Into<String>, pid: impl Into<String>) -> Self {
        self.vendor_id = Some(vid.into());
        self.product_id = Some(pid.into());
        self
    }

    /// Set serial number
    #[must_use]
    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    /// Set interface number
    #[must_use]
    pub fn interface_number(mut self, interface: impl Into<String>) -> Self {
        self.interface_number = Some(interface.into());
        self
    }

    /// Set hotplug action
    #[must_use]
    pub fn action(mut self, action: HotplugAction) -> Self {
        self.action = action;
        self
    }

    /// True when the device carries a vendor name, i.e. it sits on USB
    pub fn is_usb_serial(&self) -> bool {
        self.vendor_name.is_some()
    }

    /// `vid:pid`, with `?` for missing halves
    pub fn usb_id_label(&self) -> String {
        format!(
            "{}:{}",
            self.vendor_id.as_deref().unwrap_or("?"),
            self.product_id.as_deref().unwrap_or("?")
        )
    }
}

/// Something that can be described to the operator in a status line
#[derive(Debug, Clone, Copy)]
pub enum DeviceSummary<'a> {
    /// A device that is actually present
    Connected(&'a DeviceDescriptor),
    /// The device we are waiting for, described by the active criteria
    Expected(&'a MatchCriteria),
}

impl DeviceSummary<'_> {
    /// `" with vendor 'X' serial 'Y'"`, or empty when nothing is known
    pub fn extra_info(&self) -> String {
        let (vendor, serial) = match self {
            Self::Connected(device) => (
                device.vendor_name.as_deref(),
                device.serial_number.as_deref(),
            ),
            Self::Expected(criteria) => (
                criteria.vendor_prefix.as_deref(),
                criteria.serial.as_ref().map(SerialFilter::value),
            ),
        };

        let mut items = Vec::new();
        if let Some(vendor) = vendor {
            items.push(format!("vendor '{}'", vendor));
        }
        if let Some(serial) = serial {
            items.push(format!("serial '{}'", serial));
        }

        if items.is_empty() {
            String::new()
        } else {
            format!(" with {}", items.join(" "))
        }
    }
}
