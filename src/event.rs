//! Events delivered to subscribers.
//!
//! Two streams reach the manager:
//! - host-level [`ConnectionEvent`]s (a device was plugged in or removed), from
//!   [`HidTransport::subscribe_connections`](crate::transport::HidTransport::subscribe_connections)
//! - per-device [`InputReportEvent`]s, from
//!   [`HidDevice::subscribe_input_reports`](crate::device::HidDevice::subscribe_input_reports)
//!
//! Both carry a monotonic capture time and the device handle they concern.
//! Callbacks receive the decoded fields and the raw event.

use crate::device::DeviceHandle;
use crate::report::ReportData;
use std::time::Instant;

/// Which way a connection changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Connect,
    Disconnect,
}

/// Host-level connect/disconnect notification.
#[derive(Clone, Debug)]
pub struct ConnectionEvent {
    pub kind: ConnectionKind,
    pub device: DeviceHandle,
    /// Capture time (monotonic).
    pub at: Instant,
}

impl ConnectionEvent {
    pub fn connect(device: DeviceHandle) -> Self {
        Self {
            kind: ConnectionKind::Connect,
            device,
            at: Instant::now(),
        }
    }

    pub fn disconnect(device: DeviceHandle) -> Self {
        Self {
            kind: ConnectionKind::Disconnect,
            device,
            at: Instant::now(),
        }
    }
}

/// One input report received from an open device.
#[derive(Clone, Debug)]
pub struct InputReportEvent {
    pub device: DeviceHandle,
    /// `None` when the host cannot tell numbered from unnumbered reports.
    pub report_id: Option<u8>,
    pub data: ReportData,
    /// Capture time (monotonic).
    pub at: Instant,
}

impl InputReportEvent {
    pub fn new(device: DeviceHandle, report_id: Option<u8>, data: impl Into<ReportData>) -> Self {
        Self {
            device,
            report_id,
            data: data.into(),
            at: Instant::now(),
        }
    }
}
