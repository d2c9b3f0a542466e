//! Link configuration
//!
//! Target device, GATT layout and timing for a session.
//! Values can be overridden from a JSON file or on the command line.

use serde::{Deserialize, Serialize};
use uuid::{Uuid, uuid};

use crate::adapters::utils::is_valid_address;
use crate::app::ports::ConfigError;

/// Vendor service carrying the command characteristics.
pub const DEFAULT_SERVICE_UUID: Uuid = uuid!("0000ff00-0000-1000-8000-00805f9b34fb");
/// Board → host notifications.
pub const DEFAULT_NOTIFY_CHAR_UUID: Uuid = uuid!("0000ff01-0000-1000-8000-00805f9b34fb");
/// Host → board requests; also the read-back target.
pub const DEFAULT_COMMAND_CHAR_UUID: Uuid = uuid!("0000ff02-0000-1000-8000-00805f9b34fb");

/// Core link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // --- Target ---
    /// Display name, shown as the session title
    pub device_name: Option<String>,
    /// Bluetooth address, `XX:XX:XX:XX:XX:XX`
    pub device_address: String,

    // --- GATT layout ---
    pub service_uuid: Uuid,
    pub command_char_uuid: Uuid,
    pub notify_char_uuid: Uuid,
    /// Subscribe to `notify_char_uuid` as soon as services are discovered
    pub auto_subscribe: bool,

    // --- Timing ---
    /// How long to scan for the device before giving up (seconds)
    pub scan_timeout_secs: u32,
    /// How long to wait for replies after the last request (milliseconds)
    pub response_timeout_ms: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            device_address: String::new(),

            service_uuid: DEFAULT_SERVICE_UUID,
            command_char_uuid: DEFAULT_COMMAND_CHAR_UUID,
            notify_char_uuid: DEFAULT_NOTIFY_CHAR_UUID,
            auto_subscribe: true,

            scan_timeout_secs: 10,
            response_timeout_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_address(&self.device_address) {
            return Err(ConfigError::ValidationFailed(
                "device_address must be XX:XX:XX:XX:XX:XX",
            ));
        }
        if self.scan_timeout_secs == 0 || self.scan_timeout_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "scan_timeout_secs must be 1..=300",
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "response_timeout_ms must be non-zero",
            ));
        }
        if self.command_char_uuid == self.service_uuid {
            return Err(ConfigError::ValidationFailed(
                "command_char_uuid must differ from service_uuid",
            ));
        }
        Ok(())
    }
}
