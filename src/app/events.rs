//! Application events in both directions.
//!
//! [`GattEvent`]s flow in from the Bluetooth adapter; the
//! [`DeviceControl`](super::service::DeviceControl) emits [`AppEvent`]s
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on
//! the other side decide what to do with them (print, log, record).

use super::ports::ServiceInfo;

/// Asynchronous results reported by the Bluetooth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    /// Connected to the GATT server.
    Connected,

    /// Disconnected from the GATT server.
    Disconnected,

    /// Service discovery finished.
    ServicesDiscovered(Vec<ServiceInfo>),

    /// Data from a read or a notification, already rendered as text.
    DataAvailable(Option<String>),
}

/// Structured events emitted by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Bound to the collaborator; carries the target device.
    Started { name: Option<String>, address: String },

    /// Connection state flipped. The menu should be refreshed.
    ConnectionChanged { connected: bool },

    /// New text for the data field.
    DataChanged(String),

    /// The data field was reset to its placeholder.
    DataCleared,

    /// Service discovery summary.
    ServicesListed { services: usize, characteristics: usize },

    /// Short transient message for the user.
    Notice(&'static str),
}
