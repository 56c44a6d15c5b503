//! Manager configuration.
//!
//! [`ManagerConfig`] is read once when a [`HidManager`](crate::manager::HidManager)
//! is built and never changes afterwards. It can be built in code or loaded from
//! TOML:
//!
//! ```toml
//! auto_request = true
//! hotplug_poll_interval_ms = 500
//!
//! [[filters]]
//! vendor_id = 0x046d
//!
//! [[filters]]
//! usage_page = 0x01
//! usage = 0x05
//! ```

use crate::error::ConfigError;
use crate::metadata::DeviceMeta;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default broadcast capacity for connection and input-report streams.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default hot-plug enumeration interval for polling backends.
pub const DEFAULT_HOTPLUG_POLL_INTERVAL_MS: u64 = 1000;

/// Device-matching predicate handed to the transport's discovery call.
///
/// Every field that is set must equal the device's value; unset fields match
/// anything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub usage_page: Option<u16>,
    pub usage: Option<u16>,
}

impl DeviceFilter {
    /// Filter on vendor and product ID.
    pub fn vid_pid(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    /// Filter on top-level usage page and usage.
    pub fn usage(usage_page: u16, usage: u16) -> Self {
        Self {
            usage_page: Some(usage_page),
            usage: Some(usage),
            ..Default::default()
        }
    }

    pub fn matches(&self, meta: &DeviceMeta) -> bool {
        fn field(want: Option<u16>, have: Option<u16>) -> bool {
            want.map_or(true, |w| have == Some(w))
        }
        field(self.vendor_id, meta.vid)
            && field(self.product_id, meta.pid)
            && field(self.usage_page, meta.usage_page)
            && field(self.usage, meta.usage)
    }

    /// `true` if `meta` passes any filter in `filters`, or `filters` is empty.
    pub fn matches_any(filters: &[DeviceFilter], meta: &DeviceMeta) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(meta))
    }
}

/// Options bundle for [`HidManager`](crate::manager::HidManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Attempt a device acquisition while the manager is being built.
    pub auto_request: bool,

    /// Passed through to the transport's discovery call.
    pub filters: Vec<DeviceFilter>,

    /// Enumeration interval for backends that detect hot-plug by polling.
    pub hotplug_poll_interval_ms: u64,

    /// Capacity of the broadcast channels carrying device events.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            auto_request: false,
            filters: Vec::new(),
            hotplug_poll_interval_ms: DEFAULT_HOTPLUG_POLL_INTERVAL_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ManagerConfig {
    pub fn with_auto_request(mut self, auto_request: bool) -> Self {
        self.auto_request = auto_request;
        self
    }

    pub fn with_filters(mut self, filters: Vec<DeviceFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(vid: u16, pid: u16, usage_page: u16, usage: u16) -> DeviceMeta {
        DeviceMeta {
            vid: Some(vid),
            pid: Some(pid),
            usage_page: Some(usage_page),
            usage: Some(usage),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_inert() {
        let cfg = ManagerConfig::default();
        assert!(!cfg.auto_request);
        assert!(cfg.filters.is_empty());
        assert_eq!(cfg.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn filter_requires_every_set_field() {
        let pad = meta(0x046d, 0xc216, 0x01, 0x05);
        assert!(DeviceFilter::vid_pid(0x046d, 0xc216).matches(&pad));
        assert!(DeviceFilter::usage(0x01, 0x05).matches(&pad));
        assert!(!DeviceFilter::vid_pid(0x046d, 0xc21d).matches(&pad));
        assert!(DeviceFilter::default().matches(&pad));
        assert!(!DeviceFilter::vid_pid(1, 2).matches(&DeviceMeta::default()));
    }

    #[test]
    fn empty_filter_list_matches_everything() {
        let pad = meta(1, 2, 3, 4);
        assert!(DeviceFilter::matches_any(&[], &pad));
        assert!(!DeviceFilter::matches_any(&[DeviceFilter::vid_pid(9, 9)], &pad));
    }

    #[test]
    fn parses_toml_with_partial_fields() {
        let cfg = ManagerConfig::from_toml_str(
            r#"
            auto_request = true

            [[filters]]
            vendor_id = 0x046d

            [[filters]]
            usage_page = 1
            usage = 5
            "#,
        )
        .unwrap();
        assert!(cfg.auto_request);
        assert_eq!(cfg.hotplug_poll_interval_ms, DEFAULT_HOTPLUG_POLL_INTERVAL_MS);
        assert_eq!(cfg.filters.len(), 2);
        assert_eq!(cfg.filters[0].vendor_id, Some(0x046d));
        assert_eq!(cfg.filters[1], DeviceFilter::usage(1, 5));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hidhub.toml");
        std::fs::write(&path, "event_capacity = 8\n").unwrap();
        let cfg = ManagerConfig::load(&path).unwrap();
        assert_eq!(cfg.event_capacity, 8);
        assert!(matches!(
            ManagerConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = ManagerConfig::from_toml_str("auto_request = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
