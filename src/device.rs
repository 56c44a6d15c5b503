//! Device identity and the per-device transport surface.
//!
//! A [`HidDevice`] is owned by its transport. The open/closed state it reports
//! through [`HidDevice::opened`] belongs to the transport too; the manager only
//! observes it after each lifecycle call.
//!
//! # Identity
//! Devices are keyed by [`DeviceId`]. A transport must hand out one id per
//! physical interface and return the same [`DeviceHandle`] for it on every
//! call, so registry membership and callback lookup agree.

use crate::error::HidError;
use crate::event::InputReportEvent;
use crate::metadata::DeviceMeta;
use crate::report::ReportData;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Stable, hashable device key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Key derived from vendor/product/serial, for backends without a path.
    pub fn from_ids(vid: u16, pid: u16, serial: Option<&str>) -> Self {
        match serial {
            Some(s) if !s.is_empty() => Self(format!("{vid:04x}:{pid:04x}:{s}")),
            _ => Self(format!("{vid:04x}:{pid:04x}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A single HID interface as exposed by a transport.
#[async_trait]
pub trait HidDevice: Send + Sync {
    fn id(&self) -> &DeviceId;

    fn meta(&self) -> DeviceMeta;

    /// Transport-owned open state.
    fn opened(&self) -> bool;

    async fn open(&self) -> Result<(), HidError>;

    async fn close(&self) -> Result<(), HidError>;

    /// Close and revoke the host's authorization for this device.
    async fn forget(&self) -> Result<(), HidError>;

    /// Send an output report.
    async fn send_report(&self, report_id: u8, data: &ReportData) -> Result<(), HidError>;

    async fn send_feature_report(&self, report_id: u8, data: &ReportData)
        -> Result<(), HidError>;

    async fn receive_feature_report(&self, report_id: u8) -> Result<ReportData, HidError>;

    /// Stream of input reports. Reports sent before subscribing are not replayed.
    fn subscribe_input_reports(&self) -> broadcast::Receiver<InputReportEvent>;
}

/// Shared handle to a transport-owned device.
pub type DeviceHandle = Arc<dyn HidDevice>;

impl fmt::Debug for dyn HidDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidDevice")
            .field("id", self.id())
            .field("opened", &self.opened())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_ids_includes_serial_when_present() {
        assert_eq!(
            DeviceId::from_ids(0x046d, 0xc216, Some("A1")).as_str(),
            "046d:c216:A1"
        );
        assert_eq!(DeviceId::from_ids(0x046d, 0xc216, Some("")).as_str(), "046d:c216");
        assert_eq!(DeviceId::from_ids(1, 2, None).to_string(), "0001:0002");
    }
}
