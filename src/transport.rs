//! Host transport abstraction.
//!
//! The manager never reaches for a process-wide HID singleton. It is handed a
//! [`HidTransport`] at construction, which makes the real backend
//! ([`backends::hid`](crate::backends)) and the in-memory
//! [`VirtualTransport`](crate::backends::virtual_input::VirtualTransport)
//! interchangeable.

use crate::config::DeviceFilter;
use crate::device::DeviceHandle;
use crate::error::HidError;
use crate::event::ConnectionEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Discovery and host-level events.
#[async_trait]
pub trait HidTransport: Send + Sync {
    /// Ask the host for devices matching `filters`.
    ///
    /// On hosts with a chooser this is where the user is prompted. An empty
    /// result means nothing was selected.
    async fn request_device(&self, filters: &[DeviceFilter])
        -> Result<Vec<DeviceHandle>, HidError>;

    /// Devices the host currently authorizes this process to use.
    async fn get_devices(&self) -> Result<Vec<DeviceHandle>, HidError>;

    /// Host-level connect/disconnect stream.
    fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent>;
}

/// Type alias for a shared transport.
pub type BoxedTransport = Arc<dyn HidTransport>;
