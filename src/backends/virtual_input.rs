//! In-memory transport.
//!
//! [`VirtualTransport`] and [`VirtualDevice`] behave like a host HID stack that
//! the caller scripts by hand: add devices, plug and unplug them, push input
//! reports, and make the next open, request, or transfer fail. Every call the
//! manager makes is recorded in order so tests can assert on transport traffic.
//!
//! Like a real host, a closed device emits no input reports.

use crate::config::DeviceFilter;
use crate::device::{DeviceHandle, DeviceId, HidDevice};
use crate::error::HidError;
use crate::event::{ConnectionEvent, InputReportEvent};
use crate::metadata::DeviceMeta;
use crate::report::ReportData;
use crate::transport::HidTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// One call made into the virtual transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    RequestDevice,
    GetDevices,
    Open(DeviceId),
    Close(DeviceId),
    Forget(DeviceId),
    SendReport { device: DeviceId, report_id: u8, data: Vec<u8> },
    SendFeatureReport { device: DeviceId, report_id: u8, data: Vec<u8> },
    ReceiveFeatureReport { device: DeviceId, report_id: u8 },
}

type CallLog = Arc<Mutex<Vec<TransportCall>>>;

#[derive(Default)]
struct Script {
    open_error: Option<HidError>,
    io_error: Option<HidError>,
    open_leaves_closed: bool,
    close_leaves_open: bool,
    report_on_open: Option<(Option<u8>, ReportData)>,
}

/// Scriptable in-memory device.
pub struct VirtualDevice {
    id: DeviceId,
    meta: DeviceMeta,
    opened: AtomicBool,
    forgotten: AtomicBool,
    script: Mutex<Script>,
    feature_reports: Mutex<HashMap<u8, ReportData>>,
    input_tx: broadcast::Sender<InputReportEvent>,
    calls: CallLog,
    me: Weak<VirtualDevice>,
}

impl VirtualDevice {
    /// A standalone device with its own call log.
    pub fn new(id: &str, meta: DeviceMeta) -> Arc<Self> {
        Self::with_log(id, meta, CallLog::default())
    }

    fn with_log(id: &str, meta: DeviceMeta, calls: CallLog) -> Arc<Self> {
        let (input_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new_cyclic(|me| Self {
            id: DeviceId::new(id),
            meta,
            opened: AtomicBool::new(false),
            forgotten: AtomicBool::new(false),
            script: Mutex::new(Script::default()),
            feature_reports: Mutex::new(HashMap::new()),
            input_tx,
            calls,
            me: me.clone(),
        })
    }

    fn handle(&self) -> Option<DeviceHandle> {
        self.me.upgrade().map(|d| d as DeviceHandle)
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().push(call);
    }

    /// Make the next `open()` fail with `err`.
    pub fn fail_next_open(&self, err: HidError) {
        self.script.lock().open_error = Some(err);
    }

    /// Make the next report transfer fail with `err`.
    pub fn fail_next_io(&self, err: HidError) {
        self.script.lock().io_error = Some(err);
    }

    /// `open()` succeeds but the device stays closed.
    pub fn set_open_leaves_closed(&self, on: bool) {
        self.script.lock().open_leaves_closed = on;
    }

    /// `close()`/`forget()` succeed but the device stays open.
    pub fn set_close_leaves_open(&self, on: bool) {
        self.script.lock().close_leaves_open = on;
    }

    /// Emit a report the moment the next `open()` completes, before anyone
    /// has had a chance to subscribe.
    pub fn set_report_on_open(&self, report_id: Option<u8>, data: impl Into<ReportData>) {
        self.script.lock().report_on_open = Some((report_id, data.into()));
    }

    /// Response for `receive_feature_report(report_id)`.
    pub fn set_feature_report(&self, report_id: u8, data: impl Into<ReportData>) {
        self.feature_reports.lock().insert(report_id, data.into());
    }

    pub fn is_forgotten(&self) -> bool {
        self.forgotten.load(Ordering::SeqCst)
    }

    /// Push an input report to subscribers.
    ///
    /// Returns the number of subscribers reached; always 0 while closed.
    pub fn emit_input_report(&self, report_id: Option<u8>, data: impl Into<ReportData>) -> usize {
        if !self.opened() {
            return 0;
        }
        let Some(handle) = self.handle() else {
            return 0;
        };
        self.input_tx
            .send(InputReportEvent::new(handle, report_id, data))
            .unwrap_or(0)
    }

    fn take_io_error(&self) -> Result<(), HidError> {
        if !self.opened() {
            return Err(HidError::NotOpen);
        }
        match self.script.lock().io_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn release(&self) {
        if !self.script.lock().close_leaves_open {
            self.opened.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl HidDevice for VirtualDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn meta(&self) -> DeviceMeta {
        self.meta.clone()
    }

    fn opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), HidError> {
        self.record(TransportCall::Open(self.id.clone()));
        let report = {
            let mut script = self.script.lock();
            if let Some(err) = script.open_error.take() {
                return Err(err);
            }
            if script.open_leaves_closed {
                return Ok(());
            }
            script.report_on_open.take()
        };
        self.opened.store(true, Ordering::SeqCst);
        if let Some((report_id, data)) = report {
            self.emit_input_report(report_id, data);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HidError> {
        self.record(TransportCall::Close(self.id.clone()));
        self.release();
        Ok(())
    }

    async fn forget(&self) -> Result<(), HidError> {
        self.record(TransportCall::Forget(self.id.clone()));
        self.forgotten.store(true, Ordering::SeqCst);
        self.release();
        Ok(())
    }

    async fn send_report(&self, report_id: u8, data: &ReportData) -> Result<(), HidError> {
        self.record(TransportCall::SendReport {
            device: self.id.clone(),
            report_id,
            data: data.as_bytes().to_vec(),
        });
        self.take_io_error()
    }

    async fn send_feature_report(&self, report_id: u8, data: &ReportData) -> Result<(), HidError> {
        self.record(TransportCall::SendFeatureReport {
            device: self.id.clone(),
            report_id,
            data: data.as_bytes().to_vec(),
        });
        self.take_io_error()
    }

    async fn receive_feature_report(&self, report_id: u8) -> Result<ReportData, HidError> {
        self.record(TransportCall::ReceiveFeatureReport {
            device: self.id.clone(),
            report_id,
        });
        self.take_io_error()?;
        self.feature_reports
            .lock()
            .get(&report_id)
            .cloned()
            .ok_or_else(|| HidError::Io(format!("no feature report 0x{report_id:02x}")))
    }

    fn subscribe_input_reports(&self) -> broadcast::Receiver<InputReportEvent> {
        self.input_tx.subscribe()
    }
}

/// Scriptable in-memory host.
pub struct VirtualTransport {
    devices: Mutex<Vec<Arc<VirtualDevice>>>,
    connections: broadcast::Sender<ConnectionEvent>,
    request_error: Mutex<Option<HidError>>,
    get_devices_error: Mutex<Option<HidError>>,
    calls: CallLog,
}

impl VirtualTransport {
    pub fn new() -> Arc<Self> {
        let (connections, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            devices: Mutex::new(Vec::new()),
            connections,
            request_error: Mutex::new(None),
            get_devices_error: Mutex::new(None),
            calls: CallLog::default(),
        })
    }

    /// Make `id` known to the host. Existing ids return the existing device.
    pub fn add_device(&self, id: &str, meta: DeviceMeta) -> Arc<VirtualDevice> {
        let mut devices = self.devices.lock();
        if let Some(existing) = devices.iter().find(|d| d.id.as_str() == id) {
            return existing.clone();
        }
        let device = VirtualDevice::with_log(id, meta, self.calls.clone());
        devices.push(device.clone());
        device
    }

    pub fn device(&self, id: &str) -> Option<Arc<VirtualDevice>> {
        self.devices.lock().iter().find(|d| d.id.as_str() == id).cloned()
    }

    /// Make the next `request_device` fail with `err`.
    pub fn fail_next_request(&self, err: HidError) {
        *self.request_error.lock() = Some(err);
    }

    /// Make the next `get_devices` fail with `err`.
    pub fn fail_next_get_devices(&self, err: HidError) {
        *self.get_devices_error.lock() = Some(err);
    }

    /// Announce that `device` was plugged in. Returns receivers reached.
    pub fn connect(&self, device: &Arc<VirtualDevice>) -> usize {
        let handle: DeviceHandle = device.clone();
        self.connections
            .send(ConnectionEvent::connect(handle))
            .unwrap_or(0)
    }

    /// Announce that `device` was removed; it is closed as a side effect.
    pub fn disconnect(&self, device: &Arc<VirtualDevice>) -> usize {
        device.opened.store(false, Ordering::SeqCst);
        let handle: DeviceHandle = device.clone();
        self.connections
            .send(ConnectionEvent::disconnect(handle))
            .unwrap_or(0)
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn visible(&self) -> Vec<Arc<VirtualDevice>> {
        self.devices
            .lock()
            .iter()
            .filter(|d| !d.is_forgotten())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HidTransport for VirtualTransport {
    async fn request_device(&self, filters: &[DeviceFilter]) -> Result<Vec<DeviceHandle>, HidError> {
        self.calls.lock().push(TransportCall::RequestDevice);
        if let Some(err) = self.request_error.lock().take() {
            return Err(err);
        }
        Ok(self
            .visible()
            .into_iter()
            .filter(|d| DeviceFilter::matches_any(filters, &d.meta))
            .map(|d| d as DeviceHandle)
            .collect())
    }

    async fn get_devices(&self) -> Result<Vec<DeviceHandle>, HidError> {
        self.calls.lock().push(TransportCall::GetDevices);
        if let Some(err) = self.get_devices_error.lock().take() {
            return Err(err);
        }
        Ok(self
            .visible()
            .into_iter()
            .map(|d| d as DeviceHandle)
            .collect())
    }

    fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connections.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_device_emits_nothing() {
        let dev = VirtualDevice::new("pad", DeviceMeta::default());
        let mut rx = dev.subscribe_input_reports();
        assert_eq!(dev.emit_input_report(Some(1), vec![1]), 0);

        dev.open().await.unwrap();
        assert_eq!(dev.emit_input_report(Some(1), vec![1]), 1);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.report_id, Some(1));
        assert_eq!(ev.device.id().as_str(), "pad");
    }

    #[tokio::test]
    async fn io_requires_open_and_honours_one_shot_failure() {
        let dev = VirtualDevice::new("pad", DeviceMeta::default());
        let data = ReportData::from(vec![0xaa]);
        assert_eq!(dev.send_report(1, &data).await, Err(HidError::NotOpen));

        dev.open().await.unwrap();
        dev.fail_next_io(HidError::Io("stall".into()));
        assert_eq!(dev.send_feature_report(1, &data).await, Err(HidError::Io("stall".into())));
        assert_eq!(dev.send_feature_report(1, &data).await, Ok(()));

        dev.set_feature_report(4, vec![1, 2, 3]);
        assert_eq!(dev.receive_feature_report(4).await.unwrap().as_bytes(), &[1, 2, 3]);
        assert!(dev.receive_feature_report(5).await.is_err());
    }

    #[tokio::test]
    async fn forgotten_devices_are_hidden() {
        let host = VirtualTransport::new();
        let dev = host.add_device("pad", DeviceMeta::default());
        host.add_device("stick", DeviceMeta::default());
        assert_eq!(host.get_devices().await.unwrap().len(), 2);

        dev.forget().await.unwrap();
        let ids: Vec<_> = host
            .get_devices()
            .await
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(ids, ["stick"]);
        assert!(host.request_device(&[]).await.unwrap().iter().all(|d| d.id().as_str() != "pad"));
    }

    #[tokio::test]
    async fn request_failure_is_one_shot() {
        let host = VirtualTransport::new();
        host.add_device("pad", DeviceMeta::default());
        host.fail_next_request(HidError::PermissionDenied("denied".into()));
        assert!(host.request_device(&[]).await.is_err());
        assert_eq!(host.request_device(&[]).await.unwrap().len(), 1);
        assert_eq!(host.calls(), [TransportCall::RequestDevice, TransportCall::RequestDevice]);
    }

    #[test]
    fn add_device_is_idempotent() {
        let host = VirtualTransport::new();
        let a = host.add_device("pad", DeviceMeta::default());
        let b = host.add_device("pad", DeviceMeta::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(host.device("pad").is_some());
        assert!(host.device("nope").is_none());
    }
}
