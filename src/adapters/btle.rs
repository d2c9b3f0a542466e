//! Host Bluetooth adapter (btleplug).
//!
//! [`GattPort`] calls are accepted synchronously and queued to a worker
//! task that owns the peripheral.  Everything the radio reports back is
//! sent as a [`GattEvent`] on the channel returned by [`BtleGatt::open`].
//!
//! ```text
//!  GattPort call ──▶ op queue ──▶ worker ──▶ btleplug
//!                                   │
//!  notifications ──▶ ResponseDecoder┤
//!  adapter events ──────────────────┴──▶ GattEvent channel
//! ```
//!
//! btleplug has no reliable-write transactions, so
//! [`begin_reliable_write`](GattPort::begin_reliable_write) always fails
//! with [`GattError::Unsupported`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures_lite::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::app::events::GattEvent;
use crate::app::ports::{CharProps, CharacteristicRef, GattError, GattPort, ServiceInfo};
use crate::config::AppConfig;
use crate::protocol::{ResponseDecoder, hex};

/// Interval between peripheral list polls while scanning.
const SCAN_POLL: Duration = Duration::from_millis(300);

/// Property bits we map onto [`CharProps`].
const PROPS_MASK: u8 = 0x02 | 0x04 | 0x08 | 0x10;

enum Op {
    Connect(String),
    Disconnect,
    Write(Characteristic, Vec<u8>),
    Read(Characteristic),
    Notify(Characteristic, bool),
}

/// State shared between the port handle and its tasks.
struct Shared {
    events: UnboundedSender<GattEvent>,
    connected: AtomicBool,
    peer: Mutex<Option<PeripheralId>>,
    characteristics: Mutex<Vec<Characteristic>>,
}

impl Shared {
    /// Whoever flips the link down reports it, exactly once.
    fn link_down(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.characteristics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            let _ = self.events.send(GattEvent::Disconnected);
        }
    }
}

pub struct BtleGatt {
    adapter: Option<Adapter>,
    shared: Arc<Shared>,
    ops: Option<UnboundedSender<Op>>,
    scan_timeout: Duration,
    notify_char: Uuid,
}

impl BtleGatt {
    /// Look up the first host adapter.  A missing adapter is reported by
    /// [`initialize`](GattPort::initialize), not here.
    pub async fn open(config: &AppConfig) -> anyhow::Result<(Self, UnboundedReceiver<GattEvent>)> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?.into_iter().next();
        if adapter.is_none() {
            warn!("No Bluetooth adapter found");
        }

        let (events, rx) = unbounded_channel();
        let gatt = Self {
            adapter,
            shared: Arc::new(Shared {
                events,
                connected: AtomicBool::new(false),
                peer: Mutex::new(None),
                characteristics: Mutex::new(Vec::new()),
            }),
            ops: None,
            scan_timeout: Duration::from_secs(u64::from(config.scan_timeout_secs)),
            notify_char: config.notify_char_uuid,
        };
        Ok((gatt, rx))
    }

    fn submit(&self, op: Op) -> Result<(), GattError> {
        let ops = self.ops.as_ref().ok_or(GattError::NotInitialized)?;
        ops.send(op)
            .map_err(|_| GattError::Backend("worker stopped".into()))
    }

    fn find(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic, GattError> {
        if self.ops.is_none() {
            return Err(GattError::NotInitialized);
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(GattError::NotConnected);
        }
        let table = self
            .shared
            .characteristics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !table.iter().any(|c| c.service_uuid == service) {
            return Err(GattError::ServiceNotFound(service));
        }
        table
            .iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .cloned()
            .ok_or(GattError::CharacteristicNotFound(characteristic))
    }
}

impl GattPort for BtleGatt {
    fn initialize(&mut self) -> Result<(), GattError> {
        if self.ops.is_some() {
            return Ok(());
        }
        let adapter = self
            .adapter
            .clone()
            .ok_or_else(|| GattError::Backend("no Bluetooth adapter".into()))?;

        let (tx, rx) = unbounded_channel();
        tokio::spawn(watch_adapter(adapter.clone(), self.shared.clone()));
        tokio::spawn(run_worker(
            adapter,
            rx,
            self.shared.clone(),
            self.scan_timeout,
            self.notify_char,
        ));
        self.ops = Some(tx);
        info!("Bluetooth initialised");
        Ok(())
    }

    fn connect(&mut self, address: &str) -> Result<(), GattError> {
        self.submit(Op::Connect(address.to_string()))
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.submit(Op::Disconnect) {
            debug!("disconnect: {}", e);
        }
    }

    fn begin_reliable_write(&mut self) -> Result<(), GattError> {
        Err(GattError::Unsupported("reliable write"))
    }

    fn write_characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), GattError> {
        let target = self.find(service, characteristic)?;
        self.submit(Op::Write(target, value.to_vec()))
    }

    fn read_characteristic(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), GattError> {
        let target = self.find(service, characteristic)?;
        self.submit(Op::Read(target))
    }

    fn set_notification(
        &mut self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), GattError> {
        let target = self.find(characteristic.service, characteristic.uuid)?;
        self.submit(Op::Notify(target, enabled))
    }
}

// ───────────────────────────────────────────────────────────────
// Worker
// ───────────────────────────────────────────────────────────────

async fn run_worker(
    adapter: Adapter,
    mut ops: UnboundedReceiver<Op>,
    shared: Arc<Shared>,
    scan_timeout: Duration,
    notify_char: Uuid,
) {
    let mut peripheral: Option<Peripheral> = None;
    let mut forwarder: Option<JoinHandle<()>> = None;

    while let Some(op) = ops.recv().await {
        match op {
            Op::Connect(address) => {
                if shared.connected.load(Ordering::SeqCst) {
                    debug!("Already connected");
                    continue;
                }
                match open_link(&adapter, &address, scan_timeout).await {
                    Ok(p) => {
                        let table = service_table(&p);
                        *shared.characteristics.lock().unwrap_or_else(PoisonError::into_inner) =
                            p.characteristics().into_iter().collect();
                        *shared.peer.lock().unwrap_or_else(PoisonError::into_inner) = Some(p.id());
                        if let Some(old) = forwarder.take() {
                            old.abort();
                        }
                        forwarder = Some(tokio::spawn(forward_notifications(
                            p.clone(),
                            notify_char,
                            shared.events.clone(),
                        )));
                        shared.connected.store(true, Ordering::SeqCst);
                        let _ = shared.events.send(GattEvent::Connected);
                        let _ = shared.events.send(GattEvent::ServicesDiscovered(table));
                        peripheral = Some(p);
                    }
                    Err(e) => warn!("Connect to {} failed: {}", address, e),
                }
            }
            Op::Disconnect => {
                if let Some(p) = peripheral.take() {
                    if let Err(e) = p.disconnect().await {
                        warn!("Disconnect failed: {}", e);
                    }
                }
                if let Some(f) = forwarder.take() {
                    f.abort();
                }
                shared.link_down();
            }
            Op::Write(c, value) => {
                let Some(p) = peripheral.as_ref() else { continue };
                if let Err(e) = p.write(&c, &value, WriteType::WithResponse).await {
                    warn!("Write {} failed: {}", c.uuid, e);
                }
            }
            Op::Read(c) => {
                let Some(p) = peripheral.as_ref() else { continue };
                match p.read(&c).await {
                    Ok(value) => {
                        let text = (!value.is_empty()).then(|| hex(&value));
                        let _ = shared.events.send(GattEvent::DataAvailable(text));
                    }
                    Err(e) => warn!("Read {} failed: {}", c.uuid, e),
                }
            }
            Op::Notify(c, enabled) => {
                let Some(p) = peripheral.as_ref() else { continue };
                let result = if enabled {
                    p.subscribe(&c).await
                } else {
                    p.unsubscribe(&c).await
                };
                match result {
                    Ok(()) => debug!("Notifications on {} enabled={}", c.uuid, enabled),
                    Err(e) => warn!("Notify {} failed: {}", c.uuid, e),
                }
            }
        }
    }
    debug!("GATT worker stopped");
}

/// Scan until `address` shows up, then connect and discover services.
async fn open_link(
    adapter: &Adapter,
    address: &str,
    scan_timeout: Duration,
) -> anyhow::Result<Peripheral> {
    info!("Scanning for {}", address);
    adapter.start_scan(ScanFilter::default()).await?;

    let deadline = tokio::time::Instant::now() + scan_timeout;
    let mut found = None;
    while tokio::time::Instant::now() < deadline {
        found = adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(address));
        if found.is_some() {
            break;
        }
        tokio::time::sleep(SCAN_POLL).await;
    }
    let _ = adapter.stop_scan().await;

    let peripheral = found.ok_or_else(|| anyhow::anyhow!("{} not found within {:?}", address, scan_timeout))?;
    if !peripheral.is_connected().await? {
        peripheral.connect().await?;
    }
    peripheral.discover_services().await?;
    info!("Connected to {}", address);
    Ok(peripheral)
}

fn service_table(peripheral: &Peripheral) -> Vec<ServiceInfo> {
    peripheral
        .services()
        .into_iter()
        .map(|s| ServiceInfo {
            uuid: s.uuid,
            characteristics: s
                .characteristics
                .into_iter()
                .map(|c| CharacteristicRef {
                    service: s.uuid,
                    uuid: c.uuid,
                    properties: CharProps(c.properties.bits() & PROPS_MASK),
                })
                .collect(),
        })
        .collect()
}

/// Reassemble board replies on `notify_char` into frames; any other
/// subscribed characteristic is shown as raw hex.
async fn forward_notifications(
    peripheral: Peripheral,
    notify_char: Uuid,
    events: UnboundedSender<GattEvent>,
) {
    let mut stream = match peripheral.notifications().await {
        Ok(s) => s,
        Err(e) => {
            warn!("Notification stream unavailable: {}", e);
            return;
        }
    };

    let mut decoder = ResponseDecoder::new();
    while let Some(n) = stream.next().await {
        for event in notification_events(&mut decoder, notify_char, n.uuid, &n.value) {
            let _ = events.send(event);
        }
    }
    debug!("Notification stream closed");
}

/// Turn one notification into the events it produces.
fn notification_events(
    decoder: &mut ResponseDecoder,
    notify_char: Uuid,
    source: Uuid,
    value: &[u8],
) -> Vec<GattEvent> {
    if source != notify_char {
        return vec![GattEvent::DataAvailable((!value.is_empty()).then(|| hex(value)))];
    }

    let mut out = Vec::new();
    decoder.feed(value, |result| match result {
        Ok(frame) => out.push(GattEvent::DataAvailable(Some(frame.to_string()))),
        Err(e) => warn!("Dropped frame from {}: {}", source, e),
    });
    out
}

/// Report link loss the host stack notices on its own.
async fn watch_adapter(adapter: Adapter, shared: Arc<Shared>) {
    let mut events = match adapter.events().await {
        Ok(e) => e,
        Err(e) => {
            warn!("Adapter events unavailable: {}", e);
            return;
        }
    };

    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(id) = event {
            let ours = shared
                .peer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                == Some(&id);
            if ours {
                info!("Link lost");
                shared.link_down();
            }
        }
    }
}
