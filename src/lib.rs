//! BLE GATT central-role client driving a BlueZ-style signal bus.
//!
//! `api` holds the data model and the events delivered to the application,
//! `bluez` holds the session state machines, the operation queue, the
//! scanner and the signal router, written against the proxy traits in
//! [`bluez::proxy`].

pub mod api;
pub mod bluez;
mod error;

pub use error::{Error, Result};
