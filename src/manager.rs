//! HID lifecycle manager.
//!
//! [`HidManager`] acquires devices from a
//! [`HidTransport`](crate::transport::HidTransport), opens them, keeps the set
//! it has opened in a [`DeviceRegistry`], and fans connection and input-report
//! events out to subscribers.
//!
//! # Error contract
//! No public method returns an error. Transport failures are logged and the
//! caller gets a neutral value (`None`, an empty list, or nothing). Treat every
//! result as advisory and re-check
//! [`HidDevice::opened`](crate::device::HidDevice::opened) before relying on it.
//!
//! # Ordering
//! Subscribers in one list fire in registration order. There is no ordering
//! between the connection stream and a device's input reports. A report the
//! device emits after `open()` returns but before its listener is subscribed is
//! not delivered.
//!
//! # Example
//! ```no_run
//! use hidhub::{HidManager, ManagerConfig};
//!
//! # async fn run() {
//! let manager = HidManager::new(ManagerConfig::default()).await;
//! manager.on_connect(|dev, _| println!("connected: {}", dev.id()));
//! if let Some(pad) = manager.request_device(&[]).await {
//!     manager.on_input_report(&pad, |data, id, _, _| println!("{id:?}: {data:?}"));
//!     manager.send_report(&pad, 0, [0x01u8, 0x00]).await;
//! }
//! # }
//! ```

use crate::config::{DeviceFilter, ManagerConfig};
use crate::device::DeviceHandle;
use crate::error::HidError;
use crate::event::{ConnectionEvent, ConnectionKind, InputReportEvent};
use crate::eventbus::{run_connection_dispatcher, run_input_report_listener, CallbackRegistry};
use crate::registry::DeviceRegistry;
use crate::report::ReportData;
use crate::transport::BoxedTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct HidManager {
    transport: Option<BoxedTransport>,
    config: ManagerConfig,
    registry: Mutex<DeviceRegistry>,
    callbacks: Arc<CallbackRegistry>,
    dispatcher: Option<JoinHandle<()>>,
}

impl HidManager {
    /// Build a manager on the system HID backend.
    ///
    /// If the backend cannot initialise, the failure is logged and the manager
    /// is inert (see [`HidManager::inert`]).
    #[cfg(feature = "hid")]
    pub async fn new(config: ManagerConfig) -> Self {
        let settings = config.clone();
        let built = tokio::task::spawn_blocking(move || {
            crate::backends::hid::HidApiTransport::new(&settings)
        })
        .await
        .unwrap_or_else(|e| Err(HidError::Backend(format!("HID init task failed: {e}"))));
        match built {
            Ok(transport) => Self::with_transport(Arc::new(transport), config).await,
            Err(e) => {
                error!("Failed to initialize HID API: {}", e);
                Self::inert(config)
            }
        }
    }

    /// Build a manager on `transport`.
    ///
    /// Starts dispatching host connection events, then performs one
    /// [`request_device`](Self::request_device) if `config.auto_request` is set.
    pub async fn with_transport(transport: BoxedTransport, config: ManagerConfig) -> Self {
        let callbacks = Arc::new(CallbackRegistry::new());
        let dispatcher = tokio::spawn(run_connection_dispatcher(
            transport.subscribe_connections(),
            callbacks.clone(),
        ));

        let manager = Self {
            transport: Some(transport),
            config,
            registry: Mutex::new(DeviceRegistry::new()),
            callbacks,
            dispatcher: Some(dispatcher),
        };

        if manager.config.auto_request {
            let filters = manager.config.filters.clone();
            manager.request_device(&filters).await;
        }
        manager
    }

    /// A manager with no transport. Every operation is a no-op.
    pub fn inert(config: ManagerConfig) -> Self {
        error!("HID transport is not available; device operations are disabled");
        Self {
            transport: None,
            config,
            registry: Mutex::new(DeviceRegistry::new()),
            callbacks: Arc::new(CallbackRegistry::new()),
            dispatcher: None,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// `false` for an inert manager.
    pub fn is_available(&self) -> bool {
        self.transport.is_some()
    }

    /// Devices this manager has opened and not closed, in the order they were opened.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.registry.lock().devices()
    }

    pub fn is_cached(&self, device: &DeviceHandle) -> bool {
        self.registry.lock().contains(device.id())
    }

    fn transport(&self) -> Result<&BoxedTransport, HidError> {
        self.transport.as_ref().ok_or(HidError::TransportUnavailable)
    }

    // ---- Lifecycle -------------------------------------------------------

    /// Ask the transport for a device matching `filters` and open the first one.
    ///
    /// Returns the device even if opening it failed; `None` if nothing was
    /// selected or discovery failed.
    pub async fn request_device(&self, filters: &[DeviceFilter]) -> Option<DeviceHandle> {
        match self.try_request_device(filters).await {
            Ok(device) => Some(device),
            Err(e) => {
                error!("Request device error: {}", e);
                None
            }
        }
    }

    async fn try_request_device(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<DeviceHandle, HidError> {
        let device = self
            .transport()?
            .request_device(filters)
            .await?
            .into_iter()
            .next()
            .ok_or(HidError::NoDeviceSelected)?;
        self.open_device(&device).await;
        Ok(device)
    }

    /// The transport's authorized device list.
    ///
    /// If nothing has been opened yet, a [`request_device`](Self::request_device)
    /// runs first to prompt for one.
    pub async fn get_devices(&self, filters: &[DeviceFilter]) -> Vec<DeviceHandle> {
        let nothing_cached = self.registry.lock().is_empty();
        if nothing_cached && self.transport.is_some() {
            self.request_device(filters).await;
        }
        let result = match self.transport() {
            Ok(transport) => transport.get_devices().await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            error!("Get devices error: {}", e);
            Vec::new()
        })
    }

    /// Open `device` and start forwarding its input reports.
    ///
    /// Opening a device that is already cached does not add a second entry or
    /// a second listener.
    pub async fn open_device(&self, device: &DeviceHandle) {
        if let Err(e) = self.try_open_device(device).await {
            error!("Open device error ({}): {}", device.id(), e);
        }
    }

    async fn try_open_device(&self, device: &DeviceHandle) -> Result<(), HidError> {
        self.transport()?;
        device.open().await?;
        if !device.opened() {
            error!("Open device failed: {} still reports closed", device.id());
            return Ok(());
        }

        let mut registry = self.registry.lock();
        if !registry.insert(device.clone()) {
            debug!("Device {} already cached", device.id());
            return Ok(());
        }
        let listener = tokio::spawn(run_input_report_listener(
            device.subscribe_input_reports(),
            self.callbacks.clone(),
            device.id().clone(),
        ));
        registry.attach_listener(device.id(), listener);
        info!("Opened {} ({})", device.id(), device.meta().display_name());
        Ok(())
    }

    /// Close `device`; it leaves the registry once the transport reports it closed.
    pub async fn close_device(&self, device: &DeviceHandle) {
        if let Err(e) = self.try_release(device, Release::Close).await {
            error!("Close device error ({}): {}", device.id(), e);
        }
    }

    /// Close `device` and revoke its authorization.
    pub async fn forget_device(&self, device: &DeviceHandle) {
        if let Err(e) = self.try_release(device, Release::Forget).await {
            error!("Forget device error ({}): {}", device.id(), e);
        }
    }

    async fn try_release(&self, device: &DeviceHandle, how: Release) -> Result<(), HidError> {
        self.transport()?;
        match how {
            Release::Close => device.close().await?,
            Release::Forget => device.forget().await?,
        }
        if device.opened() {
            warn!("{} still open after {:?}", device.id(), how);
            return Ok(());
        }
        if self.registry.lock().remove(device.id()).is_some() {
            info!("Released {} ({:?})", device.id(), how);
        }
        Ok(())
    }

    // ---- Subscriptions ---------------------------------------------------

    pub fn on_connect(
        &self,
        callback: impl Fn(&DeviceHandle, &ConnectionEvent) + Send + Sync + 'static,
    ) {
        self.callbacks.add_connect(Arc::new(callback));
    }

    pub fn on_disconnect(
        &self,
        callback: impl Fn(&DeviceHandle, &ConnectionEvent) + Send + Sync + 'static,
    ) {
        self.callbacks.add_disconnect(Arc::new(callback));
    }

    /// Subscribe to input reports from `device`.
    ///
    /// Silently ignored unless `device` is currently in the registry.
    pub fn on_input_report(
        &self,
        device: &DeviceHandle,
        callback: impl Fn(&ReportData, Option<u8>, &DeviceHandle, &InputReportEvent)
            + Send
            + Sync
            + 'static,
    ) {
        let registry = self.registry.lock();
        if registry.contains(device.id()) {
            self.callbacks.add_input_report(device.id().clone(), Arc::new(callback));
        }
    }

    /// Number of input-report subscribers held for `device`.
    pub fn input_report_subscribers(&self, device: &DeviceHandle) -> usize {
        self.callbacks.input_report_count(device.id())
    }

    /// Number of connect or disconnect subscribers.
    pub fn connection_subscribers(&self, kind: ConnectionKind) -> usize {
        match kind {
            ConnectionKind::Connect => self.callbacks.connect_count(),
            ConnectionKind::Disconnect => self.callbacks.disconnect_count(),
        }
    }

    // ---- Report I/O ------------------------------------------------------

    fn ready_for_io(&self, device: &DeviceHandle, op: &str) -> bool {
        if self.transport.is_none() {
            debug!("{} on {} skipped: no transport", op, device.id());
            return false;
        }
        if !device.opened() {
            debug!("{} on {} skipped: device not open", op, device.id());
            return false;
        }
        true
    }

    /// Send an output report. No-op if `device` is not open.
    pub async fn send_report(
        &self,
        device: &DeviceHandle,
        report_id: u8,
        data: impl Into<ReportData>,
    ) {
        if !self.ready_for_io(device, "send_report") {
            return;
        }
        if let Err(e) = device.send_report(report_id, &data.into()).await {
            error!("Send report error ({}): {}", device.id(), e);
        }
    }

    /// Send a feature report. No-op if `device` is not open.
    pub async fn send_feature_report(
        &self,
        device: &DeviceHandle,
        report_id: u8,
        data: impl Into<ReportData>,
    ) {
        if !self.ready_for_io(device, "send_feature_report") {
            return;
        }
        if let Err(e) = device.send_feature_report(report_id, &data.into()).await {
            error!("Send feature report error ({}): {}", device.id(), e);
        }
    }

    /// Read a feature report. `None` if `device` is not open or the read failed.
    pub async fn receive_feature_report(
        &self,
        device: &DeviceHandle,
        report_id: u8,
    ) -> Option<ReportData> {
        if !self.ready_for_io(device, "receive_feature_report") {
            return None;
        }
        match device.receive_feature_report(report_id).await {
            Ok(data) => Some(data),
            Err(e) => {
                error!("Receive feature report error ({}): {}", device.id(), e);
                None
            }
        }
    }
}

impl Drop for HidManager {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Release {
    Close,
    Forget,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::{TransportCall, VirtualTransport};
    use crate::metadata::DeviceMeta;

    async fn manager_with(transport: &Arc<VirtualTransport>) -> HidManager {
        HidManager::with_transport(transport.clone(), ManagerConfig::default()).await
    }

    #[tokio::test]
    async fn inert_manager_never_touches_devices() {
        let transport = VirtualTransport::new();
        let dev: DeviceHandle = transport.add_device("pad", DeviceMeta::default());
        let manager = HidManager::inert(ManagerConfig::default());

        assert!(!manager.is_available());
        assert!(manager.request_device(&[]).await.is_none());
        manager.open_device(&dev).await;
        assert!(!dev.opened());
        assert!(manager.get_devices(&[]).await.is_empty());
        assert!(manager.receive_feature_report(&dev, 1).await.is_none());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn open_failure_leaves_registry_untouched() {
        let transport = VirtualTransport::new();
        let dev = transport.add_device("pad", DeviceMeta::default());
        dev.fail_next_open(HidError::PermissionDenied("busy".into()));
        let manager = manager_with(&transport).await;

        let handle: DeviceHandle = dev.clone();
        manager.open_device(&handle).await;
        assert!(manager.devices().is_empty());

        dev.set_open_leaves_closed(true);
        manager.open_device(&handle).await;
        assert!(manager.devices().is_empty());
        assert_eq!(
            transport.calls(),
            [TransportCall::Open(handle.id().clone()), TransportCall::Open(handle.id().clone())]
        );
    }

    #[tokio::test]
    async fn close_that_leaves_device_open_keeps_entry() {
        let transport = VirtualTransport::new();
        let dev = transport.add_device("pad", DeviceMeta::default());
        let handle: DeviceHandle = dev.clone();
        let manager = manager_with(&transport).await;

        manager.open_device(&handle).await;
        dev.set_close_leaves_open(true);
        manager.close_device(&handle).await;
        assert!(manager.is_cached(&handle));

        dev.set_close_leaves_open(false);
        manager.close_device(&handle).await;
        assert!(!manager.is_cached(&handle));
    }

    #[tokio::test]
    async fn auto_request_opens_first_match() {
        let transport = VirtualTransport::new();
        transport.add_device(
            "mouse",
            DeviceMeta {
                vid: Some(0x1111),
                ..Default::default()
            },
        );
        transport.add_device(
            "pad",
            DeviceMeta {
                vid: Some(0x046d),
                ..Default::default()
            },
        );
        let config = ManagerConfig::default()
            .with_auto_request(true)
            .with_filters(vec![DeviceFilter {
                vendor_id: Some(0x046d),
                ..Default::default()
            }]);
        let manager = HidManager::with_transport(transport.clone(), config).await;

        let cached: Vec<_> = manager.devices().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(cached, ["pad"]);
    }
}
