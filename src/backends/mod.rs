//! Transport backends for `hidhub`.
//!
//! Implementations of [`HidTransport`](crate::transport::HidTransport).
//!
//! # Feature flags
//! - **`hid`** enables [`hid::HidApiTransport`] over the system HID stack
//!   via `hidapi` (default).
//!
//! [`virtual_input::VirtualTransport`] is always available. It is the
//! transport used by this crate's tests and the `virtual_demo` example.

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

pub mod virtual_input;
