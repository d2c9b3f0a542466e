//! Unified error type for the crate.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! controller's and the binary's error handling uniform.

use core::fmt;

use crate::app::ports::{ConfigError, GattError};
use crate::protocol::FrameError;

/// Every fallible crate operation funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// The Bluetooth collaborator rejected an operation.
    Gatt(GattError),
    /// A frame failed validation.
    Frame(FrameError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// The Bluetooth stack could not be brought up.
    InitFailed(GattError),
    /// No collaborator is bound.
    NotBound,
    /// No discovered characteristic at this list position.
    NoSuchEntry { group: usize, child: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gatt(e) => write!(f, "gatt: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::InitFailed(e) => write!(f, "unable to initialise Bluetooth: {e}"),
            Self::NotBound => write!(f, "Bluetooth service not bound"),
            Self::NoSuchEntry { group, child } => {
                write!(f, "no characteristic at [{group}][{child}]")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gatt(e) | Self::InitFailed(e) => Some(e),
            Self::Frame(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::NotBound | Self::NoSuchEntry { .. } => None,
        }
    }
}

impl From<GattError> for Error {
    fn from(e: GattError) -> Self {
        Self::Gatt(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
