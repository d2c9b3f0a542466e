//! Port traits — the boundary between the controller and the outside world.
//!
//! ```text
//!   GattPort adapter ──▶ GattEvent ──▶ DeviceControl ──▶ AppEvent ──▶ EventSink
//!          ▲                                 │
//!          └──────────── operations ─────────┘
//! ```
//!
//! The [`DeviceControl`](super::service::DeviceControl) consumes these via
//! generics, so the controller never touches a Bluetooth stack directly.
//! Adapters live in [`crate::adapters`].

use core::fmt;

use uuid::Uuid;

use crate::config::AppConfig;

use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Characteristic handles
// ───────────────────────────────────────────────────────────────

/// Characteristic property bits (subset of the GATT property field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharProps(pub u8);

impl CharProps {
    pub const READ: Self = Self(0x02);
    pub const WRITE_NO_RESPONSE: Self = Self(0x04);
    pub const WRITE: Self = Self(0x08);
    pub const NOTIFY: Self = Self(0x10);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for CharProps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A characteristic as advertised by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
    pub properties: CharProps,
}

/// One discovered service with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicRef>,
}

// ───────────────────────────────────────────────────────────────
// GATT port (driven adapter: controller → Bluetooth stack)
// ───────────────────────────────────────────────────────────────

/// Operations the controller issues against the Bluetooth collaborator.
///
/// Calls return once the request is accepted.  Outcomes of asynchronous
/// work (connection changes, discovered services, read and notification
/// data) come back later as [`GattEvent`](super::events::GattEvent)s.
pub trait GattPort {
    /// Bring up the local Bluetooth stack.
    fn initialize(&mut self) -> Result<(), GattError>;

    /// Start connecting to the peripheral at `address`.
    fn connect(&mut self, address: &str) -> Result<(), GattError>;

    /// Drop the current connection, if any.
    fn disconnect(&mut self);

    /// Open a reliable-write transaction on the current connection.
    fn begin_reliable_write(&mut self) -> Result<(), GattError>;

    /// Write `value` to `characteristic` inside `service`.
    fn write_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), GattError>;

    /// Request a read; the value arrives as `DataAvailable`.
    fn read_characteristic(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), GattError>;

    /// Enable or disable notifications on `characteristic`.
    fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), GattError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: controller → view / log)
// ───────────────────────────────────────────────────────────────

/// The controller emits [`AppEvent`]s through this port.  Adapters
/// decide where they go (console, log, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

/// Fan-out: both sinks see every event, left first.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: controller ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`AppConfig`].
///
/// Implementations MUST call [`AppConfig::validate`] before persisting.
pub trait ConfigPort {
    /// Load configuration. `ConfigError::NotFound` when nothing is stored.
    fn load(&self) -> Result<AppConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`GattPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    /// `initialize` has not succeeded yet.
    NotInitialized,
    /// Operation needs a live connection.
    NotConnected,
    /// The peripheral does not expose this service.
    ServiceNotFound(Uuid),
    /// The service does not contain this characteristic.
    CharacteristicNotFound(Uuid),
    /// The backend cannot perform this operation at all.
    Unsupported(&'static str),
    /// The platform stack reported a failure.
    Backend(String),
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Nothing stored yet.
    NotFound,
    /// Stored config could not be parsed.
    Corrupted(String),
    /// A field failed validation.
    ValidationFailed(&'static str),
    /// Underlying I/O error.
    Io(std::io::Error),
}

impl fmt::Display for GattError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "Bluetooth not initialised"),
            Self::NotConnected => write!(f, "not connected"),
            Self::ServiceNotFound(uuid) => write!(f, "service {} not found", uuid),
            Self::CharacteristicNotFound(uuid) => write!(f, "characteristic {} not found", uuid),
            Self::Unsupported(what) => write!(f, "unsupported: {}", what),
            Self::Backend(msg) => write!(f, "backend: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for GattError {}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}
