//! Device controller — the hexagonal core.
//!
//! [`DeviceControl`] owns everything a control screen shows for one
//! device: connection state, the data field, the discovered GATT table
//! and the active notification.  All I/O flows through port traits
//! injected at call sites, so the whole controller is testable with
//! mock adapters.
//!
//! ```text
//!  GattEvent ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                │     DeviceControl       │
//!   GattPort ◀── │  state · data · table   │ ◀── AppCommand
//!                └────────────────────────┘
//! ```

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::protocol::{CommandFrame, Opcode};

use super::commands::AppCommand;
use super::events::{AppEvent, GattEvent};
use super::ports::{CharProps, CharacteristicRef, EventSink, GattError, GattPort, ServiceInfo};

/// Placeholder shown in the data field when nothing has been received.
pub const NO_DATA: &str = "No data";
/// Notice shown when a reliable-write transaction opens.
pub const NOTICE_REQUEST: &str = "Request";
/// Notice shown when a reliable-write transaction cannot be opened.
pub const NOTICE_RELIABLE_WRITE_FAILED: &str = "failed beginReliableWrite";

/// Which connection menu items are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuState {
    pub connect: bool,
    pub disconnect: bool,
}

// ───────────────────────────────────────────────────────────────
// DeviceControl
// ───────────────────────────────────────────────────────────────

pub struct DeviceControl {
    name: Option<String>,
    address: String,
    service_uuid: Uuid,
    command_char: Uuid,
    notify_char: Uuid,
    auto_subscribe: bool,

    bound: bool,
    connected: bool,
    data: Option<String>,
    /// Discovered table, indexed `[group][child]` by `SelectCharacteristic`.
    services: Vec<ServiceInfo>,
    notify_characteristic: Option<CharacteristicRef>,
    requests_sent: u64,
}

impl DeviceControl {
    /// Construct the controller for the device in `config`.
    ///
    /// Does **not** touch Bluetooth — call [`bind`](Self::bind) next.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            name: config.device_name.clone(),
            address: config.device_address.clone(),
            service_uuid: config.service_uuid,
            command_char: config.command_char_uuid,
            notify_char: config.notify_char_uuid,
            auto_subscribe: config.auto_subscribe,
            bound: false,
            connected: false,
            data: None,
            services: Vec::new(),
            notify_characteristic: None,
            requests_sent: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Attach to the Bluetooth collaborator and connect automatically.
    ///
    /// Fails only if the stack cannot be initialised; the session should
    /// end in that case.  A failed connect request is logged and left to
    /// the user to retry.
    pub fn bind(&mut self, gatt: &mut impl GattPort, sink: &mut impl EventSink) -> Result<()> {
        if let Err(e) = gatt.initialize() {
            error!("Unable to initialize Bluetooth: {}", e);
            return Err(Error::InitFailed(e));
        }
        self.bound = true;
        sink.emit(&AppEvent::Started {
            name: self.name.clone(),
            address: self.address.clone(),
        });
        info!(
            "DeviceControl bound to {} ({})",
            self.address,
            self.name.as_deref().unwrap_or("unnamed")
        );

        if let Err(e) = gatt.connect(&self.address) {
            warn!("Connect to {} failed: {}", self.address, e);
        }
        Ok(())
    }

    /// Detach from the collaborator.  Later commands are ignored.
    pub fn unbind(&mut self) {
        if self.bound {
            info!("DeviceControl unbound");
        }
        self.bound = false;
    }

    /// Come back to the foreground: reconnect if still bound.
    pub fn resume(&mut self, gatt: &mut impl GattPort) {
        if !self.bound {
            return;
        }
        let result = gatt.connect(&self.address);
        debug!("Connect request result={}", result.is_ok());
    }

    // ── Event handling ────────────────────────────────────────

    /// React to an asynchronous result from the collaborator.
    pub fn handle_event(
        &mut self,
        event: GattEvent,
        gatt: &mut impl GattPort,
        sink: &mut impl EventSink,
    ) {
        match event {
            GattEvent::Connected => {
                self.connected = true;
                info!("Connected to {}", self.address);
                sink.emit(&AppEvent::ConnectionChanged { connected: true });
            }
            GattEvent::Disconnected => {
                self.connected = false;
                // Subscriptions do not survive the link.
                self.notify_characteristic = None;
                info!("Disconnected from {}", self.address);
                sink.emit(&AppEvent::ConnectionChanged { connected: false });
                self.clear_data(sink);
            }
            GattEvent::ServicesDiscovered(services) => {
                let characteristics = services.iter().map(|s| s.characteristics.len()).sum();
                sink.emit(&AppEvent::ServicesListed {
                    services: services.len(),
                    characteristics,
                });
                debug!(
                    "Discovered {} service(s), {} characteristic(s)",
                    services.len(),
                    characteristics
                );
                self.services = services;
                if self.auto_subscribe {
                    self.subscribe_default(gatt);
                }
            }
            GattEvent::DataAvailable(Some(text)) => {
                debug!("Data: {}", text);
                self.data = Some(text.clone());
                sink.emit(&AppEvent::DataChanged(text));
            }
            GattEvent::DataAvailable(None) => {}
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process a user action.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        gatt: &mut impl GattPort,
        sink: &mut impl EventSink,
    ) {
        if !self.bound {
            warn!("Ignoring {:?}: {}", cmd, Error::NotBound);
            return;
        }

        match cmd {
            AppCommand::Connect => {
                if let Err(e) = gatt.connect(&self.address) {
                    warn!("Connect to {} failed: {}", self.address, e);
                }
            }
            AppCommand::Disconnect => gatt.disconnect(),
            AppCommand::SendRequest(opcode) => self.send_request(opcode, gatt, sink),
            AppCommand::SelectCharacteristic { group, child } => {
                if let Err(e) = self.select_characteristic(group, child, gatt) {
                    warn!("Select [{}][{}] failed: {}", group, child, e);
                }
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Connect is offered while disconnected, disconnect while connected.
    pub fn menu(&self) -> MenuState {
        MenuState {
            connect: !self.connected,
            disconnect: self.connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Current data field text.
    pub fn data(&self) -> &str {
        self.data.as_deref().unwrap_or(NO_DATA)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    /// Characteristic whose notifications are currently enabled.
    pub fn notify_characteristic(&self) -> Option<&CharacteristicRef> {
        self.notify_characteristic.as_ref()
    }

    /// Requests whose write and read-back were both accepted.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    // ── Internal ──────────────────────────────────────────────

    /// Reliable write, write the frame, then read the characteristic back.
    /// Failures are logged only.
    fn send_request(&mut self, opcode: Opcode, gatt: &mut impl GattPort, sink: &mut impl EventSink) {
        match gatt.begin_reliable_write() {
            Ok(()) => sink.emit(&AppEvent::Notice(NOTICE_REQUEST)),
            Err(e) => {
                debug!("beginReliableWrite: {}", e);
                sink.emit(&AppEvent::Notice(NOTICE_RELIABLE_WRITE_FAILED));
            }
        }

        let frame = CommandFrame::read(opcode);
        match self.transmit(&frame, gatt) {
            Ok(()) => {
                self.requests_sent += 1;
                info!("Request {} sent: {}", opcode, frame);
            }
            Err(e) => warn!("Request {} failed: {}", opcode, e),
        }
    }

    fn transmit(&self, frame: &CommandFrame, gatt: &mut impl GattPort) -> core::result::Result<(), GattError> {
        gatt.write_characteristic(self.service_uuid, self.command_char, frame.as_bytes())?;
        gatt.read_characteristic(self.service_uuid, self.command_char)
    }

    /// Readable entries cancel the active notification first; notifiable
    /// entries become the active notification.
    fn select_characteristic(
        &mut self,
        group: usize,
        child: usize,
        gatt: &mut impl GattPort,
    ) -> Result<()> {
        let Some(characteristic) = self
            .services
            .get(group)
            .and_then(|s| s.characteristics.get(child))
            .copied()
        else {
            return Err(Error::NoSuchEntry { group, child });
        };

        if characteristic.properties.contains(CharProps::READ) {
            if let Some(active) = self.notify_characteristic.take() {
                gatt.set_notification(&active, false)?;
            }
        }
        if characteristic.properties.contains(CharProps::NOTIFY) {
            gatt.set_notification(&characteristic, true)?;
            self.notify_characteristic = Some(characteristic);
        }
        Ok(())
    }

    fn subscribe_default(&mut self, gatt: &mut impl GattPort) {
        let found = self
            .services
            .iter()
            .filter(|s| s.uuid == self.service_uuid)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == self.notify_char && c.properties.contains(CharProps::NOTIFY))
            .copied();

        let Some(characteristic) = found else {
            debug!("No notifiable {} in {}", self.notify_char, self.service_uuid);
            return;
        };
        match gatt.set_notification(&characteristic, true) {
            Ok(()) => self.notify_characteristic = Some(characteristic),
            Err(e) => warn!("Subscribe to {} failed: {}", characteristic.uuid, e),
        }
    }

    fn clear_data(&mut self, sink: &mut impl EventSink) {
        self.data = None;
        sink.emit(&AppEvent::DataCleared);
    }
}
