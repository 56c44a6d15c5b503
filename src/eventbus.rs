//! Callback registries and event dispatch.
//!
//! [`CallbackRegistry`] keeps three append-only subscriber lists: connect,
//! disconnect, and one input-report list per [`DeviceId`]. Dispatch walks a list
//! in registration order.
//!
//! # Fault isolation
//! Each subscriber runs under [`std::panic::catch_unwind`]. A panicking
//! subscriber is logged and the next one still runs.
//!
//! # Locking
//! Lists live behind `parking_lot` mutexes. Dispatch clones the list under the
//! lock and invokes it after releasing, so a subscriber may register another
//! subscriber, and a registration racing a dispatch never disturbs it. A
//! subscriber added during a dispatch first fires on the next event.

use crate::device::{DeviceHandle, DeviceId};
use crate::event::{ConnectionEvent, ConnectionKind, InputReportEvent};
use crate::report::ReportData;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, warn};

/// Subscriber for host-level connect/disconnect events.
pub type ConnectionCallback = Arc<dyn Fn(&DeviceHandle, &ConnectionEvent) + Send + Sync>;

/// Subscriber for a device's input reports: payload, report id, device, raw event.
pub type InputReportCallback =
    Arc<dyn Fn(&ReportData, Option<u8>, &DeviceHandle, &InputReportEvent) + Send + Sync>;

#[derive(Default)]
pub struct CallbackRegistry {
    connect: Mutex<Vec<ConnectionCallback>>,
    disconnect: Mutex<Vec<ConnectionCallback>>,
    input_reports: Mutex<HashMap<DeviceId, Vec<InputReportCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connect(&self, callback: ConnectionCallback) {
        self.connect.lock().push(callback);
    }

    pub fn add_disconnect(&self, callback: ConnectionCallback) {
        self.disconnect.lock().push(callback);
    }

    /// Append an input-report subscriber for `id`.
    ///
    /// No membership check happens here; the manager only calls this for
    /// devices in its registry.
    pub fn add_input_report(&self, id: DeviceId, callback: InputReportCallback) {
        self.input_reports.lock().entry(id).or_default().push(callback);
    }

    pub fn connect_count(&self) -> usize {
        self.connect.lock().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect.lock().len()
    }

    pub fn input_report_count(&self, id: &DeviceId) -> usize {
        self.input_reports.lock().get(id).map_or(0, Vec::len)
    }

    /// Fan a connection event out to the matching list.
    ///
    /// Returns how many subscribers completed without panicking.
    pub fn dispatch_connection(&self, event: &ConnectionEvent) -> usize {
        let callbacks = match event.kind {
            ConnectionKind::Connect => self.connect.lock().clone(),
            ConnectionKind::Disconnect => self.disconnect.lock().clone(),
        };
        callbacks
            .iter()
            .filter(|cb| invoke_isolated("connection", || cb(&event.device, event)))
            .count()
    }

    /// Fan an input report out to the subscribers of its device.
    ///
    /// A device with no subscribers is treated as an empty list.
    pub fn dispatch_input_report(&self, event: &InputReportEvent) -> usize {
        let callbacks = self
            .input_reports
            .lock()
            .get(event.device.id())
            .cloned()
            .unwrap_or_default();
        callbacks
            .iter()
            .filter(|cb| {
                invoke_isolated("input report", || {
                    cb(&event.data, event.report_id, &event.device, event)
                })
            })
            .count()
    }
}

fn invoke_isolated(kind: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!("Panic in {} callback: {}", kind, msg);
            false
        }
    }
}

/// Forward host connection events to `callbacks` until the stream closes.
pub(crate) async fn run_connection_dispatcher(
    mut rx: broadcast::Receiver<ConnectionEvent>,
    callbacks: Arc<CallbackRegistry>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                debug!("{:?} event for {}", event.kind, event.device.id());
                callbacks.dispatch_connection(&event);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Connection stream lagged, {} event(s) dropped", skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Connection stream closed");
                break;
            }
        }
    }
}

/// Forward one device's input reports to `callbacks` until the stream closes
/// or the task is aborted.
pub(crate) async fn run_input_report_listener(
    mut rx: broadcast::Receiver<InputReportEvent>,
    callbacks: Arc<CallbackRegistry>,
    id: DeviceId,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                callbacks.dispatch_input_report(&event);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Input reports from {} lagged, {} report(s) dropped", id, skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Input report stream for {} closed", id);
                break;
            }
        }
    }
}
