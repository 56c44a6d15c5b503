//! Device metadata snapshot.
//!
//! [`DeviceMeta`] is a lightweight, cloneable description of a HID interface
//! suitable for filtering, display, and logging. Transports populate what they
//! know; unknown fields remain `None`.
//!
//! # Conventions
//! - `bus` is a short, human-readable bus hint like `"usb"` or `"bluetooth"`.
//! - `path` is an OS/topology path (opaque string) useful for diagnostics.
//!
//! ## Identity notes
//! `vid`/`pid` and `serial_number` are generally stable across reconnects.
//! `path` may change across ports and reconnects; the manager keys devices by
//! [`DeviceId`](crate::device::DeviceId), not by metadata.
//!
//! # Example
//! ```
//! use hidhub::DeviceMeta;
//!
//! let meta = DeviceMeta {
//!     vid: Some(0x046d),
//!     pid: Some(0xc216),
//!     product_string: Some("Gamepad F310".into()),
//!     ..Default::default()
//! };
//! assert_eq!(meta.display_name(), "Gamepad F310");
//! ```

use serde::{Deserialize, Serialize};

/// Snapshot of metadata describing a single HID interface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    /// High-level bus classification (e.g., `"usb"`, `"bluetooth"`, `"virtual"`).
    pub bus: Option<String>,

    /// USB Vendor ID (VID), if known.
    pub vid: Option<u16>,

    /// USB Product ID (PID), if known.
    pub pid: Option<u16>,

    /// Human-readable product name from the driver/firmware.
    pub product_string: Option<String>,

    /// Device serial number supplied by firmware/OS, if present.
    pub serial_number: Option<String>,

    /// HID interface index. Some stacks use `-1` to mean "not applicable".
    pub interface_number: Option<i32>,

    /// Top-level HID Usage Page, if known.
    pub usage_page: Option<u16>,

    /// Top-level HID Usage within the page, if known.
    pub usage: Option<u16>,

    /// OS/topological path to the device. Treat as opaque.
    pub path: Option<String>,
}

impl DeviceMeta {
    /// Product string if present, otherwise `VID:PID` in hex, otherwise `"Unknown"`.
    pub fn display_name(&self) -> String {
        match (&self.product_string, self.vid, self.pid) {
            (Some(name), _, _) if !name.is_empty() => name.clone(),
            (_, Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
            _ => "Unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_ids() {
        let meta = DeviceMeta {
            vid: Some(0x054c),
            pid: Some(0x0ce6),
            product_string: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(meta.display_name(), "054c:0ce6");
        assert_eq!(DeviceMeta::default().display_name(), "Unknown");
    }
}
