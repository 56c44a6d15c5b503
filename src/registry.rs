//! Device registry.
//!
//! The set of devices the manager has opened and not yet closed or forgotten,
//! in insertion order and unique by [`DeviceId`]. Each entry owns the task that
//! forwards the device's input reports; dropping the entry aborts that task.

use crate::device::{DeviceHandle, DeviceId};
use tokio::task::JoinHandle;

struct Entry {
    device: DeviceHandle,
    listener: Option<JoinHandle<()>>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[derive(Default)]
pub struct DeviceRegistry {
    entries: Vec<Entry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.entries.iter().any(|e| e.device.id() == id)
    }

    /// Insert `device` unless an entry with the same id exists.
    ///
    /// Returns `true` if the device was inserted.
    pub fn insert(&mut self, device: DeviceHandle) -> bool {
        if self.contains(device.id()) {
            return false;
        }
        self.entries.push(Entry {
            device,
            listener: None,
        });
        true
    }

    /// Hand the input-report listener task for `id` to its entry.
    ///
    /// If `id` is not registered the task is aborted immediately.
    pub fn attach_listener(&mut self, id: &DeviceId, listener: JoinHandle<()>) {
        match self.entries.iter_mut().find(|e| e.device.id() == id) {
            Some(entry) => {
                if let Some(old) = entry.listener.replace(listener) {
                    old.abort();
                }
            }
            None => listener.abort(),
        }
    }

    /// Remove the entry for `id`, aborting its listener.
    pub fn remove(&mut self, id: &DeviceId) -> Option<DeviceHandle> {
        let idx = self.entries.iter().position(|e| e.device.id() == id)?;
        let entry = self.entries.remove(idx);
        Some(entry.device.clone())
    }

    /// Registered devices in insertion order.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.entries.iter().map(|e| e.device.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_input::VirtualDevice;
    use crate::metadata::DeviceMeta;
    use std::time::Duration;

    fn handle(id: &str) -> DeviceHandle {
        VirtualDevice::new(id, DeviceMeta::default())
    }

    #[test]
    fn insert_is_unique_by_id_and_ordered() {
        let mut reg = DeviceRegistry::new();
        assert!(reg.insert(handle("a")));
        assert!(reg.insert(handle("b")));
        assert!(!reg.insert(handle("a")));
        assert_eq!(reg.len(), 2);
        let ids: Vec<_> = reg.devices().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn remove_unknown_is_none() {
        let mut reg = DeviceRegistry::new();
        reg.insert(handle("a"));
        assert!(reg.remove(&DeviceId::from("zz")).is_none());
        assert!(reg.remove(&DeviceId::from("a")).is_some());
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn removing_entry_aborts_listener() {
        let mut reg = DeviceRegistry::new();
        let id = DeviceId::from("a");
        reg.insert(handle("a"));
        let task = tokio::spawn(async {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        let abort = task.abort_handle();
        reg.attach_listener(&id, task);
        assert!(!abort.is_finished());

        reg.remove(&id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn listener_for_unknown_device_is_aborted() {
        let mut reg = DeviceRegistry::new();
        let task = tokio::spawn(std::future::pending::<()>());
        let abort = task.abort_handle();
        reg.attach_listener(&DeviceId::from("ghost"), task);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(abort.is_finished());
    }
}
