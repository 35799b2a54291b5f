//! Device metadata snapshot.
//!
//! [`DeviceMeta`] is a lightweight, cloneable description of a device suitable for listings and
//! logs. Backends populate what they know; unknown fields remain `None`.
//!
//! # Conventions
//! - `bus` is a short, human-readable bus hint like `"usb"`, `"bluetooth"`, `"i2c"` or `"virtual"`.
//! - `phys` is the kernel's physical topology path; treat it as diagnostic, not identity.
//! - `path` is the node the device was opened from. Node numbers are reassigned across
//!   reconnects, so never persist them.

use serde::{Deserialize, Serialize};

/// Snapshot of metadata describing a single input node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// High-level bus classification.
    pub bus: Option<String>,

    /// Vendor ID, if known.
    pub vid: Option<u16>,

    /// Product ID, if known.
    pub pid: Option<u16>,

    /// Driver-reported version.
    pub version: Option<u16>,

    /// Human-readable product name.
    pub product_string: Option<String>,

    /// Kernel physical path (`usb-0000:00:14.0-1/input0`).
    pub phys: Option<String>,

    /// Unique identifier reported by the driver (often a serial number).
    pub uniq: Option<String>,

    /// Node path the device was opened from.
    pub path: Option<String>,
}

/// Short bus name for a Linux `BUS_*` constant.
pub fn bus_name(bus: u16) -> &'static str {
    match bus {
        0x01 => "pci",
        0x03 => "usb",
        0x05 => "bluetooth",
        0x06 => "virtual",
        0x11 => "i8042",
        0x18 => "i2c",
        0x19 => "host",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_name() {
        assert_eq!(bus_name(0x03), "usb");
        assert_eq!(bus_name(0x18), "i2c");
        assert_eq!(bus_name(0x7f), "other");
    }

    #[test]
    fn test_meta_serializes_to_json() {
        let meta = DeviceMeta {
            bus: Some("usb".into()),
            vid: Some(0x046d),
            pid: Some(0xc52b),
            product_string: Some("Logitech USB Receiver".into()),
            path: Some("/dev/input/event4".into()),
            ..DeviceMeta::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"vid\":1133"));
        assert!(json.contains("event4"));
    }
}
