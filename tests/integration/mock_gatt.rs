//! Recording adapters for integration tests.
//!
//! `MockGatt` records every port call and never produces events on its
//! own; tests feed `GattEvent`s to the controller by hand.

use bmslink::app::events::AppEvent;
use bmslink::app::ports::{CharProps, CharacteristicRef, EventSink, GattError, GattPort, ServiceInfo};
use bmslink::config::{
    AppConfig, DEFAULT_COMMAND_CHAR_UUID, DEFAULT_NOTIFY_CHAR_UUID, DEFAULT_SERVICE_UUID,
};
use uuid::{Uuid, uuid};

pub const ADDRESS: &str = "A4:C1:38:00:11:22";
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize,
    Connect(String),
    Disconnect,
    BeginReliableWrite,
    Write { service: Uuid, characteristic: Uuid, value: Vec<u8> },
    Read { service: Uuid, characteristic: Uuid },
    SetNotification { characteristic: Uuid, enabled: bool },
}

// ── MockGatt ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockGatt {
    pub calls: Vec<Call>,
    pub fail_init: bool,
    pub fail_connect: bool,
    pub fail_reliable_write: bool,
    pub fail_write: bool,
}

#[allow(dead_code)]
impl MockGatt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(Uuid, bool)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::SetNotification { characteristic, enabled } => Some((*characteristic, *enabled)),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }
}

impl GattPort for MockGatt {
    fn initialize(&mut self) -> Result<(), GattError> {
        self.calls.push(Call::Initialize);
        if self.fail_init {
            return Err(GattError::Backend("no adapter".into()));
        }
        Ok(())
    }

    fn connect(&mut self, address: &str) -> Result<(), GattError> {
        self.calls.push(Call::Connect(address.to_string()));
        if self.fail_connect {
            return Err(GattError::Backend("radio busy".into()));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.calls.push(Call::Disconnect);
    }

    fn begin_reliable_write(&mut self) -> Result<(), GattError> {
        self.calls.push(Call::BeginReliableWrite);
        if self.fail_reliable_write {
            return Err(GattError::Unsupported("reliable write"));
        }
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), GattError> {
        self.calls.push(Call::Write {
            service,
            characteristic,
            value: value.to_vec(),
        });
        if self.fail_write {
            return Err(GattError::NotConnected);
        }
        Ok(())
    }

    fn read_characteristic(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), GattError> {
        self.calls.push(Call::Read {
            service,
            characteristic,
        });
        Ok(())
    }

    fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), GattError> {
        self.calls.push(Call::SetNotification {
            characteristic: characteristic.uuid,
            enabled,
        });
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<AppEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub fn config() -> AppConfig {
    AppConfig {
        device_name: Some("pack-a".into()),
        device_address: ADDRESS.into(),
        ..AppConfig::default()
    }
}

/// Battery service (one readable entry), then the vendor service.
pub fn table() -> Vec<ServiceInfo> {
    vec![
        ServiceInfo {
            uuid: BATTERY_SERVICE,
            characteristics: vec![CharacteristicRef {
                service: BATTERY_SERVICE,
                uuid: BATTERY_LEVEL,
                properties: CharProps::READ,
            }],
        },
        ServiceInfo {
            uuid: DEFAULT_SERVICE_UUID,
            characteristics: vec![
                CharacteristicRef {
                    service: DEFAULT_SERVICE_UUID,
                    uuid: DEFAULT_NOTIFY_CHAR_UUID,
                    properties: CharProps::NOTIFY,
                },
                CharacteristicRef {
                    service: DEFAULT_SERVICE_UUID,
                    uuid: DEFAULT_COMMAND_CHAR_UUID,
                    properties: CharProps::WRITE | CharProps::READ,
                },
            ],
        },
    ]
}
