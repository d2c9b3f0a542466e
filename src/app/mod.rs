//! Application core — pure controller logic, zero I/O.
//!
//! [`service::DeviceControl`] holds the state of one device session.
//! All interaction with Bluetooth, configuration storage and the view
//! happens through **port traits** defined in [`ports`], keeping this
//! layer fully testable without a radio.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
