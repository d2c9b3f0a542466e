//! Simulated battery board.
//!
//! Implements [`GattPort`] entirely in memory so the controller can run
//! without a radio: host-side tests and `bmslink --simulate` both use it.
//!
//! ## GATT layout
//!
//! | Group | Service  | Characteristic | Props             |
//! |-------|----------|----------------|-------------------|
//! | 0     | `1800`   | `2a00` name    | Read              |
//! | 1     | `ff00`   | `ff01` notify  | Read+Notify       |
//! | 1     | `ff00`   | `ff02` command | Read+Write        |
//!
//! A valid read request written to `ff02` is answered on `ff01` (when
//! notifications are on) through the same [`ResponseDecoder`] a real
//! link uses.  Reading `ff02` returns the last value written to it.
//!
//! Replies are held in flight until the next port call completes (or the
//! next [`SimulatedBms::drain_events`]), so a write followed by a
//! read-back sees the read result first and the reply after it, as on air.

use std::collections::HashMap;

use log::{debug, info};
use uuid::{Uuid, uuid};

use crate::adapters::utils::is_valid_address;
use crate::app::events::GattEvent;
use crate::app::ports::{CharProps, CharacteristicRef, GattError, GattPort, ServiceInfo};
use crate::config::{DEFAULT_COMMAND_CHAR_UUID, DEFAULT_NOTIFY_CHAR_UUID, DEFAULT_SERVICE_UUID};
use crate::protocol::{CommandFrame, Opcode, ResponseDecoder, ResponseFrame, hex};

const GENERIC_ACCESS_UUID: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");
const DEVICE_NAME_UUID: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Notification payload size on a default 23-byte MTU.
const NOTIFY_CHUNK: usize = 20;

/// Status byte the board uses for registers it does not know.
const STATUS_UNSUPPORTED: u8 = 0x80;

/// One recorded call on the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattCall {
    Initialize,
    Connect(String),
    Disconnect,
    BeginReliableWrite,
    Write {
        service: Uuid,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    Read {
        service: Uuid,
        characteristic: Uuid,
    },
    SetNotification {
        characteristic: Uuid,
        enabled: bool,
    },
}

type Broadcast = Box<dyn FnMut(GattEvent) + Send>;

pub struct SimulatedBms {
    calls: Vec<GattCall>,
    broadcast: Option<Broadcast>,
    pending: Vec<GattEvent>,
    in_flight: Vec<GattEvent>,

    initialized: bool,
    connected: bool,
    reliable_write_supported: bool,
    init_fails: bool,

    services: Vec<ServiceInfo>,
    values: HashMap<Uuid, Vec<u8>>,
    notifying: Vec<Uuid>,
    responses: HashMap<Opcode, ResponseFrame>,
    decoder: ResponseDecoder,
}

impl SimulatedBms {
    pub fn new() -> Self {
        let services = vec![
            ServiceInfo {
                uuid: GENERIC_ACCESS_UUID,
                characteristics: vec![CharacteristicRef {
                    service: GENERIC_ACCESS_UUID,
                    uuid: DEVICE_NAME_UUID,
                    properties: CharProps::READ,
                }],
            },
            ServiceInfo {
                uuid: DEFAULT_SERVICE_UUID,
                characteristics: vec![
                    CharacteristicRef {
                        service: DEFAULT_SERVICE_UUID,
                        uuid: DEFAULT_NOTIFY_CHAR_UUID,
                        properties: CharProps::READ | CharProps::NOTIFY,
                    },
                    CharacteristicRef {
                        service: DEFAULT_SERVICE_UUID,
                        uuid: DEFAULT_COMMAND_CHAR_UUID,
                        properties: CharProps::READ | CharProps::WRITE | CharProps::WRITE_NO_RESPONSE,
                    },
                ],
            },
        ];

        let mut values = HashMap::new();
        values.insert(DEVICE_NAME_UUID, b"SIM-BMS".to_vec());

        Self {
            calls: Vec::new(),
            broadcast: None,
            pending: Vec::new(),
            in_flight: Vec::new(),
            initialized: false,
            connected: false,
            reliable_write_supported: true,
            init_fails: false,
            services,
            values,
            notifying: Vec::new(),
            responses: canned_responses(),
            decoder: ResponseDecoder::new(),
        }
    }

    /// Deliver events through `f` instead of the internal queue.
    #[must_use]
    pub fn with_broadcast(mut self, f: impl FnMut(GattEvent) + Send + 'static) -> Self {
        self.broadcast = Some(Box::new(f));
        self
    }

    /// Make `initialize` fail, as with a powered-off adapter.
    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.init_fails = true;
        self
    }

    /// Toggle reliable-write support.
    #[must_use]
    pub fn with_reliable_write(mut self, supported: bool) -> Self {
        self.reliable_write_supported = supported;
        self
    }

    /// Take every event queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<GattEvent> {
        self.deliver_replies();
        std::mem::take(&mut self.pending)
    }

    pub fn calls(&self) -> &[GattCall] {
        &self.calls
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_notifying(&self, characteristic: Uuid) -> bool {
        self.notifying.contains(&characteristic)
    }

    /// Simulate the board walking out of range.
    pub fn drop_link(&mut self) {
        if self.connected {
            self.teardown();
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn publish(&mut self, event: GattEvent) {
        match &mut self.broadcast {
            Some(f) => f(event),
            None => self.pending.push(event),
        }
    }

    /// Publish notify replies that were in flight.
    fn deliver_replies(&mut self) {
        for event in std::mem::take(&mut self.in_flight) {
            self.publish(event);
        }
    }

    fn teardown(&mut self) {
        self.in_flight.clear();
        self.connected = false;
        self.notifying.clear();
        self.decoder.reset();
        info!("sim: link down");
        self.publish(GattEvent::Disconnected);
    }

    fn lookup(&self, service: Uuid, characteristic: Uuid) -> Result<CharacteristicRef, GattError> {
        let svc = self
            .services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(GattError::ServiceNotFound(service))?;
        svc.characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .copied()
            .ok_or(GattError::CharacteristicNotFound(characteristic))
    }

    fn read_value(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), GattError> {
        self.require_link()?;
        let target = self.lookup(service, characteristic)?;
        if !target.properties.contains(CharProps::READ) {
            return Err(GattError::Unsupported("read"));
        }

        let text = self
            .values
            .get(&characteristic)
            .filter(|v| !v.is_empty())
            .map(|v| hex(v));
        self.publish(GattEvent::DataAvailable(text));
        Ok(())
    }

    fn require_link(&self) -> Result<(), GattError> {
        if !self.initialized {
            return Err(GattError::NotInitialized);
        }
        if !self.connected {
            return Err(GattError::NotConnected);
        }
        Ok(())
    }

    /// Answer a command written by the host.
    fn respond(&mut self, raw: &[u8]) {
        let frame = match CommandFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("sim: ignoring write ({})", e);
                return;
            }
        };

        let response = self
            .responses
            .get(&frame.opcode())
            .cloned()
            .or_else(|| ResponseFrame::new(frame.opcode(), STATUS_UNSUPPORTED, &[]));
        let Some(response) = response else {
            return;
        };
        if !self.notifying.contains(&DEFAULT_NOTIFY_CHAR_UUID) {
            debug!("sim: {} answered with notifications off", frame.opcode());
            return;
        }

        let wire = response.encode();
        let mut rendered = Vec::new();
        for chunk in wire.chunks(NOTIFY_CHUNK) {
            self.decoder.feed(chunk, |r| match r {
                Ok(frame) => rendered.push(frame.to_string()),
                Err(e) => debug!("sim: decode error {}", e),
            });
        }
        self.in_flight
            .extend(rendered.into_iter().map(|text| GattEvent::DataAvailable(Some(text))));
    }
}

impl Default for SimulatedBms {
    fn default() -> Self {
        Self::new()
    }
}

impl GattPort for SimulatedBms {
    fn initialize(&mut self) -> Result<(), GattError> {
        self.calls.push(GattCall::Initialize);
        if self.init_fails {
            return Err(GattError::Backend("adapter powered off".into()));
        }
        self.initialized = true;
        Ok(())
    }

    fn connect(&mut self, address: &str) -> Result<(), GattError> {
        self.deliver_replies();
        self.calls.push(GattCall::Connect(address.to_string()));
        if !self.initialized {
            return Err(GattError::NotInitialized);
        }
        if !is_valid_address(address) {
            return Err(GattError::Backend(format!("invalid address {address}")));
        }
        if self.connected {
            debug!("sim: already connected");
            return Ok(());
        }

        self.connected = true;
        info!("sim: link up to {}", address);
        self.publish(GattEvent::Connected);
        let services = self.services.clone();
        self.publish(GattEvent::ServicesDiscovered(services));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.deliver_replies();
        self.calls.push(GattCall::Disconnect);
        if self.connected {
            self.teardown();
        }
    }

    fn begin_reliable_write(&mut self) -> Result<(), GattError> {
        self.deliver_replies();
        self.calls.push(GattCall::BeginReliableWrite);
        self.require_link()?;
        if !self.reliable_write_supported {
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
        self.deliver_replies();
        self.calls.push(GattCall::Write {
            service,
            characteristic,
            value: value.to_vec(),
        });
        self.require_link()?;
        let target = self.lookup(service, characteristic)?;
        if !(target.properties.contains(CharProps::WRITE)
            || target.properties.contains(CharProps::WRITE_NO_RESPONSE))
        {
            return Err(GattError::Unsupported("write"));
        }

        self.values.insert(characteristic, value.to_vec());
        if characteristic == DEFAULT_COMMAND_CHAR_UUID {
            self.respond(value);
        }
        Ok(())
    }

    fn read_characteristic(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), GattError> {
        self.calls.push(GattCall::Read {
            service,
            characteristic,
        });
        let result = self.read_value(service, characteristic);
        self.deliver_replies();
        result
    }

    fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), GattError> {
        self.calls.push(GattCall::SetNotification {
            characteristic: characteristic.uuid,
            enabled,
        });
        self.require_link()?;
        let target = self.lookup(characteristic.service, characteristic.uuid)?;
        if !target.properties.contains(CharProps::NOTIFY) {
            return Err(GattError::Unsupported("notify"));
        }

        self.notifying.retain(|u| *u != target.uuid);
        if enabled {
            self.notifying.push(target.uuid);
        }
        Ok(())
    }
}

/// Replies for a four-cell pack at rest.
fn canned_responses() -> HashMap<Opcode, ResponseFrame> {
    let basic_info: [u8; 27] = [
        0x05, 0x36, // total voltage, 10 mV
        0x00, 0x00, // current, 10 mA
        0x0B, 0xB8, // remaining capacity, 10 mAh
        0x0F, 0xA0, // nominal capacity, 10 mAh
        0x00, 0x05, // cycles
        0x2A, 0x47, // production date
        0x00, 0x00, // balance low
        0x00, 0x00, // balance high
        0x00, 0x00, // protection flags
        0x10, // software version
        0x4B, // state of charge, %
        0x03, // FET state
        0x04, // cell count
        0x02, // NTC count
        0x0B, 0x8F, 0x0B, 0x91, // NTC readings, 0.1 K
    ];
    let cell_voltages: [u8; 8] = [0x0D, 0x05, 0x0D, 0x07, 0x0D, 0x02, 0x0D, 0x06];
    let extended: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00];

    [
        (Opcode::BASIC_INFO, &basic_info[..]),
        (Opcode::CELL_VOLTAGES, &cell_voltages[..]),
        (Opcode::EXTENDED_INFO, &extended[..]),
    ]
    .into_iter()
    .filter_map(|(op, payload)| ResponseFrame::new(op, 0, payload).map(|f| (op, f)))
    .collect()
}
