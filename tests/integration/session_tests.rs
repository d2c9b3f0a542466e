//! Lifecycle and event handling: bind, connection changes, discovery,
//! data field updates.

use bmslink::Error;
use bmslink::app::commands::AppCommand;
use bmslink::app::events::{AppEvent, GattEvent};
use bmslink::app::service::{DeviceControl, MenuState, NO_DATA};
use bmslink::config::{AppConfig, DEFAULT_NOTIFY_CHAR_UUID};

use super::mock_gatt::{ADDRESS, Call, MockGatt, RecordingSink, config, table};

fn bound() -> (DeviceControl, MockGatt, RecordingSink) {
    let mut control = DeviceControl::new(&config());
    let mut gatt = MockGatt::new();
    let mut sink = RecordingSink::new();
    control.bind(&mut gatt, &mut sink).unwrap();
    gatt.calls.clear();
    sink.take();
    (control, gatt, sink)
}

// ── Bind ──────────────────────────────────────────────────────

#[test]
fn bind_initialises_then_connects() {
    let mut control = DeviceControl::new(&config());
    let mut gatt = MockGatt::new();
    let mut sink = RecordingSink::new();

    control.bind(&mut gatt, &mut sink).unwrap();

    assert!(control.is_bound());
    assert_eq!(gatt.calls, vec![Call::Initialize, Call::Connect(ADDRESS.into())]);
    assert_eq!(
        sink.events,
        vec![AppEvent::Started {
            name: Some("pack-a".into()),
            address: ADDRESS.into(),
        }]
    );
}

#[test]
fn bind_fails_when_stack_does_not_initialise() {
    let mut control = DeviceControl::new(&config());
    let mut gatt = MockGatt {
        fail_init: true,
        ..MockGatt::new()
    };
    let mut sink = RecordingSink::new();

    let err = control.bind(&mut gatt, &mut sink).unwrap_err();

    assert!(matches!(err, Error::InitFailed(_)));
    assert!(!control.is_bound());
    assert_eq!(gatt.calls, vec![Call::Initialize]);
    assert!(sink.events.is_empty());
}

#[test]
fn rejected_connect_does_not_fail_bind() {
    let mut control = DeviceControl::new(&config());
    let mut gatt = MockGatt {
        fail_connect: true,
        ..MockGatt::new()
    };
    let mut sink = RecordingSink::new();

    assert!(control.bind(&mut gatt, &mut sink).is_ok());
    assert!(control.is_bound());
    assert!(!control.is_connected());
}

// ── Connection state ──────────────────────────────────────────

#[test]
fn connected_flips_menu() {
    let (mut control, mut gatt, mut sink) = bound();

    control.handle_event(GattEvent::Connected, &mut gatt, &mut sink);

    assert!(control.is_connected());
    assert_eq!(
        control.menu(),
        MenuState {
            connect: false,
            disconnect: true
        }
    );
    assert_eq!(sink.take(), vec![AppEvent::ConnectionChanged { connected: true }]);
}

#[test]
fn disconnected_clears_data_and_subscription() {
    let (mut control, mut gatt, mut sink) = bound();
    control.handle_event(GattEvent::Connected, &mut gatt, &mut sink);
    control.handle_event(GattEvent::ServicesDiscovered(table()), &mut gatt, &mut sink);
    control.handle_event(
        GattEvent::DataAvailable(Some("DD A5 03 00 FF FD 77".into())),
        &mut gatt,
        &mut sink,
    );
    assert!(control.notify_characteristic().is_some());
    sink.take();

    control.handle_event(GattEvent::Disconnected, &mut gatt, &mut sink);

    assert!(!control.is_connected());
    assert_eq!(control.data(), NO_DATA);
    assert!(control.notify_characteristic().is_none());
    assert_eq!(
        control.menu(),
        MenuState {
            connect: true,
            disconnect: false
        }
    );
    assert_eq!(
        sink.take(),
        vec![
            AppEvent::ConnectionChanged { connected: false },
            AppEvent::DataCleared,
        ]
    );
}

// ── Discovery ─────────────────────────────────────────────────

#[test]
fn discovery_lists_table_and_subscribes() {
    let (mut control, mut gatt, mut sink) = bound();

    control.handle_event(GattEvent::ServicesDiscovered(table()), &mut gatt, &mut sink);

    assert_eq!(
        sink.take(),
        vec![AppEvent::ServicesListed {
            services: 2,
            characteristics: 3
        }]
    );
    assert_eq!(control.services().len(), 2);
    assert_eq!(gatt.notifications(), vec![(DEFAULT_NOTIFY_CHAR_UUID, true)]);
    assert_eq!(
        control.notify_characteristic().map(|c| c.uuid),
        Some(DEFAULT_NOTIFY_CHAR_UUID)
    );
}

#[test]
fn discovery_without_auto_subscribe_leaves_notifications_alone() {
    let cfg = AppConfig {
        auto_subscribe: false,
        ..config()
    };
    let mut control = DeviceControl::new(&cfg);
    let mut gatt = MockGatt::new();
    let mut sink = RecordingSink::new();
    control.bind(&mut gatt, &mut sink).unwrap();

    control.handle_event(GattEvent::ServicesDiscovered(table()), &mut gatt, &mut sink);

    assert!(gatt.notifications().is_empty());
    assert!(control.notify_characteristic().is_none());
}

#[test]
fn discovery_without_vendor_service_subscribes_nothing() {
    let (mut control, mut gatt, mut sink) = bound();
    let mut services = table();
    services.truncate(1);

    control.handle_event(GattEvent::ServicesDiscovered(services), &mut gatt, &mut sink);

    assert!(gatt.notifications().is_empty());
    assert_eq!(
        sink.take(),
        vec![AppEvent::ServicesListed {
            services: 1,
            characteristics: 1
        }]
    );
}

// ── Data field ────────────────────────────────────────────────

#[test]
fn data_available_updates_field() {
    let (mut control, mut gatt, mut sink) = bound();
    assert_eq!(control.data(), NO_DATA);

    control.handle_event(
        GattEvent::DataAvailable(Some("0x03 (basic-info) ok len=0".into())),
        &mut gatt,
        &mut sink,
    );

    assert_eq!(control.data(), "0x03 (basic-info) ok len=0");
    assert_eq!(
        sink.take(),
        vec![AppEvent::DataChanged("0x03 (basic-info) ok len=0".into())]
    );
}

#[test]
fn absent_data_is_ignored() {
    let (mut control, mut gatt, mut sink) = bound();
    control.handle_event(GattEvent::DataAvailable(Some("01".into())), &mut gatt, &mut sink);
    sink.take();

    control.handle_event(GattEvent::DataAvailable(None), &mut gatt, &mut sink);

    assert_eq!(control.data(), "01");
    assert!(sink.events.is_empty());
}

// ── Menu commands ─────────────────────────────────────────────

#[test]
fn connect_and_disconnect_commands_reach_the_port() {
    let (mut control, mut gatt, mut sink) = bound();

    control.handle_command(AppCommand::Disconnect, &mut gatt, &mut sink);
    control.handle_command(AppCommand::Connect, &mut gatt, &mut sink);

    assert_eq!(gatt.calls, vec![Call::Disconnect, Call::Connect(ADDRESS.into())]);
}

#[test]
fn commands_are_ignored_while_unbound() {
    let mut control = DeviceControl::new(&config());
    let mut gatt = MockGatt::new();
    let mut sink = RecordingSink::new();

    control.handle_command(AppCommand::Connect, &mut gatt, &mut sink);
    control.handle_command(
        AppCommand::SendRequest(bmslink::protocol::Opcode::BASIC_INFO),
        &mut gatt,
        &mut sink,
    );

    assert!(gatt.calls.is_empty());
    assert!(sink.events.is_empty());
}

#[test]
fn unbind_stops_command_handling() {
    let (mut control, mut gatt, mut sink) = bound();
    control.unbind();

    control.handle_command(AppCommand::Connect, &mut gatt, &mut sink);

    assert!(!control.is_bound());
    assert!(gatt.calls.is_empty());
}

#[test]
fn resume_reconnects_only_when_bound() {
    let (mut control, mut gatt, _sink) = bound();

    control.resume(&mut gatt);
    assert_eq!(gatt.calls, vec![Call::Connect(ADDRESS.into())]);

    control.unbind();
    gatt.calls.clear();
    control.resume(&mut gatt);
    assert!(gatt.calls.is_empty());
}
