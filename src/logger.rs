//! Logging setup and ready-made logging subscribers.

use crate::error::ConfigError;
use crate::event::ConnectionKind;
use crate::manager::HidManager;
use crate::DeviceHandle;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a `tracing` fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (e.g. `"info"` or
/// `"hidhub=debug"`) is used.
pub fn init_logging(default_level: &str) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Log every connect and disconnect the manager sees.
pub fn log_connections(manager: &HidManager) {
    for kind in [ConnectionKind::Connect, ConnectionKind::Disconnect] {
        let callback = move |dev: &DeviceHandle, _: &crate::ConnectionEvent| {
            info!(
                "[{:?}] {} ({})",
                kind,
                dev.id(),
                dev.meta().display_name()
            );
        };
        match kind {
            ConnectionKind::Connect => manager.on_connect(callback),
            ConnectionKind::Disconnect => manager.on_disconnect(callback),
        }
    }
}

/// Log every input report from `device` at debug level.
///
/// Like any input-report subscription, ignored unless `device` is open.
pub fn log_input_reports(manager: &HidManager, device: &DeviceHandle) {
    manager.on_input_report(device, |data, report_id, dev, _| {
        debug!("[Input] {} id={:?} {:02x?}", dev.id(), report_id, data.as_bytes());
    });
}
