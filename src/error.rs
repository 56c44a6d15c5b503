//! Error types.
//!
//! [`HidError`] is what transports return. The manager never lets one escape its
//! public surface: every failure is logged and turned into a neutral result.
//! [`ConfigError`] is only returned by configuration loading.

use thiserror::Error;

/// Failures reported by a [`HidTransport`](crate::transport::HidTransport) or
/// [`HidDevice`](crate::device::HidDevice).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HidError {
    /// The host has no HID capability at all.
    #[error("HID transport is not available")]
    TransportUnavailable,

    /// The host refused access to the device.
    #[error("HID permission denied: {0}")]
    PermissionDenied(String),

    /// Discovery finished without any device being selected.
    #[error("No device selected")]
    NoDeviceSelected,

    /// An I/O operation needs an open device.
    #[error("Device is not open")]
    NotOpen,

    /// The device went away while in use.
    #[error("Device disconnected")]
    Disconnected,

    /// Report transfer failed.
    #[error("HID I/O error: {0}")]
    Io(String),

    /// Anything else the backend wants to surface.
    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "hid")]
impl From<hidapi::HidError> for HidError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") || msg.contains("EACCES") {
            HidError::PermissionDenied(msg)
        } else {
            HidError::Io(msg)
        }
    }
}

/// Errors from loading a [`ManagerConfig`](crate::config::ManagerConfig) or
/// installing the log subscriber.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid log filter: {0}")]
    Logging(String),
}
