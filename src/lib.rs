//! bmslink library.
//!
//! Command framing, response reassembly and the device controller for
//! JBD-style battery management boards reached over Bluetooth LE.  The
//! radio backend lives behind the `btle` feature; everything else builds
//! and tests on any host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod protocol;

pub use error::{Error, Result};
