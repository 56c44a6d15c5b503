//! `hidapi`-backed transport.
//!
//! Native hosts have no device chooser: [`HidApiTransport::request_device`]
//! returns every enumerated interface matching the filters, and access is
//! checked when the device is opened.
//!
//! Each open device gets a reader thread that forwards input reports to its
//! broadcast channel. `hidapi` does not say whether a device uses numbered
//! reports, so reports are forwarded exactly as read with `report_id = None`.
//!
//! Hot-plug is detected by re-enumerating on a timer once somebody subscribes
//! to connection events.
//!
//! Every `hidapi` call that can block (enumeration, open, writes and feature
//! transfers) runs on tokio's blocking pool.

use crate::config::{DeviceFilter, ManagerConfig};
use crate::device::{DeviceHandle, DeviceId, HidDevice};
use crate::error::HidError;
use crate::event::{ConnectionEvent, InputReportEvent};
use crate::metadata::DeviceMeta;
use crate::report::ReportData;
use crate::transport::HidTransport;
use async_trait::async_trait;
use hidapi::{BusType, DeviceInfo, HidApi};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Poll timeout for the reader thread; bounds how long writers wait for the handle.
const READ_TIMEOUT_MS: i32 = 10;

/// Large enough for any full-speed or high-speed HID report.
const INPUT_REPORT_BUF_LEN: usize = 1024;

/// Largest feature report hidapi will move in one call.
const FEATURE_REPORT_BUF_LEN: usize = 4096;

type SharedApi = Arc<Mutex<HidApi>>;
type Forgotten = Arc<Mutex<HashSet<DeviceId>>>;

fn bus_name(bus: BusType) -> Option<&'static str> {
    match bus {
        BusType::Usb => Some("usb"),
        BusType::Bluetooth => Some("bluetooth"),
        BusType::I2c => Some("i2c"),
        BusType::Spi => Some("spi"),
        _ => None,
    }
}

fn meta_from_info(info: &DeviceInfo) -> DeviceMeta {
    DeviceMeta {
        bus: bus_name(info.bus_type()).map(str::to_string),
        vid: Some(info.vendor_id()),
        pid: Some(info.product_id()),
        product_string: info.product_string().map(str::to_string),
        serial_number: info.serial_number().map(str::to_string),
        interface_number: Some(info.interface_number()),
        usage_page: Some(info.usage_page()),
        usage: Some(info.usage()),
        path: Some(info.path().to_string_lossy().into_owned()),
    }
}

/// `vid:pid[:serial]@path`. OS paths are recycled between devices, so the
/// path alone does not identify one.
fn device_key(vid: u16, pid: u16, serial: Option<&str>, path: &str) -> DeviceId {
    DeviceId::new(format!("{}@{}", DeviceId::from_ids(vid, pid, serial), path))
}

fn id_from_info(info: &DeviceInfo) -> DeviceId {
    device_key(
        info.vendor_id(),
        info.product_id(),
        info.serial_number(),
        &info.path().to_string_lossy(),
    )
}

/// Output and feature reports go out as `[report_id, payload..]`.
fn frame_report(report_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 1);
    buf.push(report_id);
    buf.extend_from_slice(payload);
    buf
}

fn check_written(written: usize, expected: usize) -> Result<(), HidError> {
    if written < expected {
        return Err(HidError::Io(format!("short write: {written} of {expected} bytes")));
    }
    Ok(())
}

/// Payload of a feature read of `n` bytes. The first byte echoes the report id.
fn strip_report_id(buf: &[u8], n: usize) -> ReportData {
    ReportData::from(buf.get(1..n.min(buf.len())).unwrap_or(&[]))
}

/// Run a blocking `hidapi` call off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T, HidError>
where
    F: FnOnce() -> Result<T, HidError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HidError::Backend(format!("blocking HID task failed: {e}")))?
}

struct OpenHandle {
    device: Arc<Mutex<hidapi::HidDevice>>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl OpenHandle {
    fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// One HID interface reachable through `hidapi`.
pub struct HidApiDevice {
    id: DeviceId,
    meta: DeviceMeta,
    info: DeviceInfo,
    api: SharedApi,
    forgotten: Forgotten,
    handle: Mutex<Option<OpenHandle>>,
    input_tx: broadcast::Sender<InputReportEvent>,
    me: Weak<HidApiDevice>,
}

impl HidApiDevice {
    fn new(info: DeviceInfo, api: SharedApi, forgotten: Forgotten, capacity: usize) -> Arc<Self> {
        let (input_tx, _) = broadcast::channel(capacity.max(1));
        Arc::new_cyclic(|me| Self {
            id: id_from_info(&info),
            meta: meta_from_info(&info),
            info,
            api,
            forgotten,
            handle: Mutex::new(None),
            input_tx,
            me: me.clone(),
        })
    }

    fn io_handle(&self) -> Result<Arc<Mutex<hidapi::HidDevice>>, HidError> {
        match self.handle.lock().as_ref() {
            Some(h) if h.alive.load(Ordering::SeqCst) => Ok(h.device.clone()),
            Some(_) => Err(HidError::Disconnected),
            None => Err(HidError::NotOpen),
        }
    }

    fn spawn_reader(&self, open: &OpenHandle) -> Result<(), HidError> {
        let device = open.device.clone();
        let shutdown = open.shutdown.clone();
        let alive = open.alive.clone();
        let owner = self.me.clone();
        let tx = self.input_tx.clone();
        let id = self.id.clone();
        std::thread::Builder::new()
            .name("hidhub-reader".into())
            .spawn(move || run_reader(device, owner, tx, shutdown, alive, id))
            .map(|_| ())
            .map_err(|e| HidError::Backend(format!("failed to spawn reader thread: {e}")))
    }

    fn drop_handle(&self) {
        if let Some(open) = self.handle.lock().take() {
            open.stop();
        }
    }
}

fn run_reader(
    device: Arc<Mutex<hidapi::HidDevice>>,
    owner: Weak<HidApiDevice>,
    tx: broadcast::Sender<InputReportEvent>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    id: DeviceId,
) {
    let mut buf = vec![0u8; INPUT_REPORT_BUF_LEN];
    while !shutdown.load(Ordering::SeqCst) {
        let read = device.lock().read_timeout(&mut buf, READ_TIMEOUT_MS);
        match read {
            Ok(0) => continue,
            Ok(n) => {
                let Some(owner) = owner.upgrade() else {
                    break;
                };
                let handle: DeviceHandle = owner;
                // No receivers is normal between subscriptions.
                let _ = tx.send(InputReportEvent::new(handle, None, &buf[..n]));
            }
            Err(e) => {
                warn!("Read from {} failed, stopping reader: {}", id, e);
                alive.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
    debug!("Reader for {} exited", id);
}

#[async_trait]
impl HidDevice for HidApiDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn meta(&self) -> DeviceMeta {
        self.meta.clone()
    }

    fn opened(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|h| h.alive.load(Ordering::SeqCst))
    }

    async fn open(&self) -> Result<(), HidError> {
        if self.opened() {
            return Ok(());
        }
        if self.forgotten.lock().contains(&self.id) {
            return Err(HidError::PermissionDenied(format!("{} was forgotten", self.id)));
        }
        let api = self.api.clone();
        let info = self.info.clone();
        let raw = blocking(move || {
            let api = api.lock();
            Ok(info.open_device(&api)?)
        })
        .await?;
        let open = OpenHandle {
            device: Arc::new(Mutex::new(raw)),
            shutdown: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(true)),
        };
        self.spawn_reader(&open)?;
        if let Some(stale) = self.handle.lock().replace(open) {
            stale.stop();
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HidError> {
        self.drop_handle();
        Ok(())
    }

    async fn forget(&self) -> Result<(), HidError> {
        self.drop_handle();
        self.forgotten.lock().insert(self.id.clone());
        Ok(())
    }

    async fn send_report(&self, report_id: u8, data: &ReportData) -> Result<(), HidError> {
        let device = self.io_handle()?;
        let buf = frame_report(report_id, data.as_bytes());
        blocking(move || {
            let written = device.lock().write(&buf)?;
            check_written(written, buf.len())
        })
        .await
    }

    async fn send_feature_report(&self, report_id: u8, data: &ReportData) -> Result<(), HidError> {
        let device = self.io_handle()?;
        let buf = frame_report(report_id, data.as_bytes());
        blocking(move || Ok(device.lock().send_feature_report(&buf)?)).await
    }

    async fn receive_feature_report(&self, report_id: u8) -> Result<ReportData, HidError> {
        let device = self.io_handle()?;
        blocking(move || {
            let mut buf = vec![0u8; FEATURE_REPORT_BUF_LEN];
            buf[0] = report_id;
            let n = device.lock().get_feature_report(&mut buf)?;
            Ok(strip_report_id(&buf, n))
        })
        .await
    }

    fn subscribe_input_reports(&self) -> broadcast::Receiver<InputReportEvent> {
        self.input_tx.subscribe()
    }
}

impl Drop for HidApiDevice {
    fn drop(&mut self) {
        self.drop_handle();
    }
}

struct Inner {
    api: SharedApi,
    forgotten: Forgotten,
    devices: Mutex<HashMap<DeviceId, Arc<HidApiDevice>>>,
    connections: broadcast::Sender<ConnectionEvent>,
    watcher_started: AtomicBool,
    poll_interval: Duration,
    capacity: usize,
}

impl Inner {
    /// Refresh enumeration and return `(id, info)` for every visible interface.
    fn enumerate(&self) -> Result<Vec<(DeviceId, DeviceInfo)>, HidError> {
        let mut api = self.api.lock();
        api.refresh_devices()?;
        let forgotten = self.forgotten.lock();
        Ok(api
            .device_list()
            .map(|info| (id_from_info(info), info.clone()))
            .filter(|(id, _)| !forgotten.contains(id))
            .collect())
    }

    /// Cached handle for `id`, created from `info` on first sight.
    fn device_for(&self, id: DeviceId, info: DeviceInfo) -> Arc<HidApiDevice> {
        self.devices
            .lock()
            .entry(id)
            .or_insert_with(|| {
                HidApiDevice::new(info, self.api.clone(), self.forgotten.clone(), self.capacity)
            })
            .clone()
    }

    fn handles(&self, filters: &[DeviceFilter]) -> Result<Vec<DeviceHandle>, HidError> {
        Ok(self
            .enumerate()?
            .into_iter()
            .map(|(id, info)| self.device_for(id, info))
            .filter(|d| DeviceFilter::matches_any(filters, &d.meta))
            .map(|d| d as DeviceHandle)
            .collect())
    }

    /// Diff enumeration against `known` and broadcast the changes.
    fn poll_hotplug(&self, known: &mut HashSet<DeviceId>) {
        let current = match self.enumerate() {
            Ok(list) => list,
            Err(e) => {
                warn!("Hot-plug enumeration failed: {}", e);
                return;
            }
        };
        let ids: HashSet<DeviceId> = current.iter().map(|(id, _)| id.clone()).collect();

        for (id, info) in current {
            if known.contains(&id) {
                continue;
            }
            let device: DeviceHandle = self.device_for(id, info);
            debug!("Device connected: {}", device.id());
            let _ = self.connections.send(ConnectionEvent::connect(device));
        }

        for gone in known.difference(&ids) {
            let device = self.devices.lock().remove(gone);
            if let Some(device) = device {
                device.drop_handle();
                debug!("Device disconnected: {}", gone);
                let _ = self.connections.send(ConnectionEvent::disconnect(device));
            }
        }
        *known = ids;
    }
}

/// Transport over the system HID stack.
pub struct HidApiTransport {
    inner: Arc<Inner>,
}

impl HidApiTransport {
    pub fn new(config: &ManagerConfig) -> Result<Self, HidError> {
        let api = HidApi::new()?;
        let (connections, _) = broadcast::channel(config.event_capacity.max(1));
        info!("HID API initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                api: Arc::new(Mutex::new(api)),
                forgotten: Forgotten::default(),
                devices: Mutex::new(HashMap::new()),
                connections,
                watcher_started: AtomicBool::new(false),
                poll_interval: Duration::from_millis(config.hotplug_poll_interval_ms.max(1)),
                capacity: config.event_capacity,
            }),
        })
    }

    fn start_watcher(&self) {
        if self.inner.watcher_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.poll_interval;
        let spawned = std::thread::Builder::new()
            .name("hidhub-hotplug".into())
            .spawn(move || {
                // Devices present when watching starts are not announced.
                let mut known: HashSet<DeviceId> = match weak.upgrade().map(|i| i.enumerate()) {
                    Some(Ok(list)) => list.into_iter().map(|(id, _)| id).collect(),
                    Some(Err(_)) => HashSet::new(),
                    None => return,
                };
                loop {
                    std::thread::sleep(interval);
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    inner.poll_hotplug(&mut known);
                }
            });
        if let Err(e) = spawned {
            warn!("Hot-plug watcher unavailable: {}", e);
            self.inner.watcher_started.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl HidTransport for HidApiTransport {
    async fn request_device(&self, filters: &[DeviceFilter]) -> Result<Vec<DeviceHandle>, HidError> {
        let inner = self.inner.clone();
        let filters = filters.to_vec();
        blocking(move || inner.handles(&filters)).await
    }

    async fn get_devices(&self) -> Result<Vec<DeviceHandle>, HidError> {
        let inner = self.inner.clone();
        blocking(move || inner.handles(&[])).await
    }

    fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent> {
        let rx = self.inner.connections.subscribe();
        self.start_watcher();
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_framed_with_their_id() {
        assert_eq!(frame_report(0x05, &[0xaa, 0xbb]), [0x05, 0xaa, 0xbb]);
        assert_eq!(frame_report(0, &[]), [0]);
    }

    #[test]
    fn short_write_is_an_io_error() {
        assert_eq!(check_written(3, 3), Ok(()));
        assert_eq!(check_written(4, 3), Ok(()));
        assert_eq!(
            check_written(2, 3),
            Err(HidError::Io("short write: 2 of 3 bytes".into()))
        );
    }

    #[test]
    fn feature_read_drops_echoed_id() {
        let buf = [0x07, 0x10, 0x20, 0x30, 0x00];
        assert_eq!(strip_report_id(&buf, 4).as_bytes(), [0x10, 0x20, 0x30]);
        assert!(strip_report_id(&buf, 1).is_empty());
        assert!(strip_report_id(&buf, 0).is_empty());
        // Lengths past the buffer are clamped.
        assert_eq!(strip_report_id(&buf, 99).len(), 4);
    }

    #[test]
    fn bus_types_map_to_names() {
        assert_eq!(bus_name(BusType::Usb), Some("usb"));
        assert_eq!(bus_name(BusType::Bluetooth), Some("bluetooth"));
        assert_eq!(bus_name(BusType::I2c), Some("i2c"));
        assert_eq!(bus_name(BusType::Spi), Some("spi"));
        assert_eq!(bus_name(BusType::Unknown), None);
    }

    #[test]
    fn recycled_path_yields_distinct_ids() {
        let pad = device_key(0x046d, 0xc216, Some("A1"), "/dev/hidraw3");
        let stick = device_key(0x044f, 0xb10a, None, "/dev/hidraw3");
        assert_eq!(pad.as_str(), "046d:c216:A1@/dev/hidraw3");
        assert_eq!(stick.as_str(), "044f:b10a@/dev/hidraw3");
        assert_ne!(pad, stick);
    }

    #[tokio::test]
    async fn blocking_runs_off_the_runtime_and_propagates_errors() {
        assert_eq!(blocking(|| Ok(7)).await, Ok(7));
        assert_eq!(
            blocking::<(), _>(|| Err(HidError::NotOpen)).await,
            Err(HidError::NotOpen)
        );
    }
}
