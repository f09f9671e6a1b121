//! Device matching
//!
//! [`matches`] decides whether a tty device is a USB serial device the
//! operator asked for. It never fails: a property missing for an active
//! criterion simply means "no match".

use serde::{Deserialize, Serialize};

use super::device::DeviceDescriptor;

/// How a serial number criterion is compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialFilter {
    /// Serial number must equal the value
    Exact(String),
    /// Serial number must start with the value
    Prefix(String),
}

impl SerialFilter {
    /// The configured value, regardless of mode
    pub fn value(&self) -> &str {
        match self {
            Self::Exact(value) | Self::Prefix(value) => value,
        }
    }

    fn accepts(&self, serial: &str) -> bool {
        match self {
            Self::Exact(value) => serial == value,
            Self::Prefix(value) => serial.starts_with(value.as_str()),
        }
    }
}

/// Filters applied to candidate devices. `None` means "don't care".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCriteria {
    /// Substring of the device node path
    pub path_contains: Option<String>,
    /// Prefix of the vendor name
    pub vendor_prefix: Option<String>,
    /// Serial number filter
    pub serial: Option<SerialFilter>,
    /// USB interface number, compared exactly
    pub interface_number: Option<String>,
    /// USB vendor id, compared exactly
    pub vendor_id: Option<String>,
    /// USB product id, compared exactly
    pub product_id: Option<String>,
}

impl MatchCriteria {
    /// True when no filter is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Check a device against the criteria
pub fn matches(device: &DeviceDescriptor, criteria: &MatchCriteria) -> bool {
    let Some(vendor_name) = device.vendor_name.as_deref() else {
        return false;
    };

    if let Some(fragment) = &criteria.path_contains {
        if !device.path.contains(fragment.as_str()) {
            return false;
        }
    }
    if let Some(prefix) = &criteria.vendor_prefix {
        if !vendor_name.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(filter) = &criteria.serial {
        match device.serial_number.as_deref() {
            Some(serial) if filter.accepts(serial) => {}
            _ => return false,
        }
    }

    equals_if_set(&criteria.interface_number, &device.interface_number)
        && equals_if_set(&criteria.vendor_id, &device.vendor_id)
        && equals_if_set(&criteria.product_id, &device.product_id)
}

fn equals_if_set(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual.as_deref() == Some(wanted.as_str()),
    }
}
