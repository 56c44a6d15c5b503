//! hidhub: HID device lifecycle and event fan-out for Rust.
//!
//! Acquires devices from a host transport, tracks which ones are open, and
//! delivers connect, disconnect, and input-report events to subscribers in
//! registration order. Report payloads are opaque bytes.
//!
//! Start with [`HidManager`]. Transports implement [`HidTransport`]; the
//! `hid` feature provides one over `hidapi`, and
//! [`backends::virtual_input`] provides an in-memory one.

pub mod backends;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod filtered_listener;
pub mod logger;
pub mod manager;
pub mod metadata;
pub mod registry;
pub mod report;
pub mod transport;

pub use config::*;
pub use device::*;
pub use error::*;
pub use event::*;
pub use eventbus::{CallbackRegistry, ConnectionCallback, InputReportCallback};
pub use filtered_listener::FilteredListener;
pub use manager::*;
pub use metadata::*;
pub use report::*;
pub use transport::*;
