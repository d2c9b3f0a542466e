//! Request path (reliable write → write → read-back) and characteristic
//! selection, first against the recording mock, then end to end against
//! the simulated board.

use bmslink::adapters::sim::SimulatedBms;
use bmslink::app::commands::AppCommand;
use bmslink::app::events::{AppEvent, GattEvent};
use bmslink::app::service::{
    DeviceControl, NO_DATA, NOTICE_RELIABLE_WRITE_FAILED, NOTICE_REQUEST,
};
use bmslink::config::{DEFAULT_COMMAND_CHAR_UUID, DEFAULT_NOTIFY_CHAR_UUID, DEFAULT_SERVICE_UUID};
use bmslink::protocol::Opcode;

use super::mock_gatt::{BATTERY_LEVEL, Call, MockGatt, RecordingSink, config, table};

fn connected() -> (DeviceControl, MockGatt, RecordingSink) {
    let mut control = DeviceControl::new(&config());
    let mut gatt = MockGatt::new();
    let mut sink = RecordingSink::new();
    control.bind(&mut gatt, &mut sink).unwrap();
    control.handle_event(GattEvent::Connected, &mut gatt, &mut sink);
    control.handle_event(GattEvent::ServicesDiscovered(table()), &mut gatt, &mut sink);
    gatt.calls.clear();
    sink.take();
    (control, gatt, sink)
}

// ── SendRequest ───────────────────────────────────────────────

#[test]
fn basic_info_request_writes_then_reads_back() {
    let (mut control, mut gatt, mut sink) = connected();

    control.handle_command(AppCommand::SendRequest(Opcode::BASIC_INFO), &mut gatt, &mut sink);

    assert_eq!(
        gatt.calls,
        vec![
            Call::BeginReliableWrite,
            Call::Write {
                service: DEFAULT_SERVICE_UUID,
                characteristic: DEFAULT_COMMAND_CHAR_UUID,
                value: vec![0xDD, 0xA5, 0x03, 0x00, 0xFF, 0xFD, 0x77],
            },
            Call::Read {
                service: DEFAULT_SERVICE_UUID,
                characteristic: DEFAULT_COMMAND_CHAR_UUID,
            },
        ]
    );
    assert_eq!(sink.take(), vec![AppEvent::Notice(NOTICE_REQUEST)]);
    assert_eq!(control.requests_sent(), 1);
}

#[test]
fn each_button_sends_its_frame() {
    let (mut control, mut gatt, mut sink) = connected();

    for op in Opcode::PRESETS {
        control.handle_command(AppCommand::SendRequest(op), &mut gatt, &mut sink);
    }

    assert_eq!(
        gatt.writes(),
        vec![
            vec![0xDD, 0xA5, 0x03, 0x00, 0xFF, 0xFD, 0x77],
            vec![0xDD, 0xA5, 0x04, 0x00, 0xFF, 0xFC, 0x77],
            vec![0xDD, 0xA5, 0x12, 0x00, 0xFF, 0xEE, 0x77],
        ]
    );
    assert_eq!(control.requests_sent(), 3);
}

#[test]
fn reliable_write_failure_is_reported_but_request_still_goes_out() {
    let (mut control, mut gatt, mut sink) = connected();
    gatt.fail_reliable_write = true;

    control.handle_command(AppCommand::SendRequest(Opcode::CELL_VOLTAGES), &mut gatt, &mut sink);

    assert_eq!(sink.take(), vec![AppEvent::Notice(NOTICE_RELIABLE_WRITE_FAILED)]);
    assert_eq!(gatt.writes().len(), 1);
    assert_eq!(control.requests_sent(), 1);
}

#[test]
fn failed_write_skips_read_back() {
    let (mut control, mut gatt, mut sink) = connected();
    gatt.fail_write = true;

    control.handle_command(AppCommand::SendRequest(Opcode::BASIC_INFO), &mut gatt, &mut sink);

    assert!(!gatt.calls.iter().any(|c| matches!(c, Call::Read { .. })));
    assert_eq!(control.requests_sent(), 0);
}

// ── SelectCharacteristic ──────────────────────────────────────

#[test]
fn selecting_readable_entry_cancels_active_notification() {
    let (mut control, mut gatt, mut sink) = connected();
    assert!(control.notify_characteristic().is_some());

    control.handle_command(
        AppCommand::SelectCharacteristic { group: 0, child: 0 },
        &mut gatt,
        &mut sink,
    );

    assert_eq!(gatt.notifications(), vec![(DEFAULT_NOTIFY_CHAR_UUID, false)]);
    assert!(control.notify_characteristic().is_none());
}

#[test]
fn selecting_notifiable_entry_enables_it() {
    let (mut control, mut gatt, mut sink) = connected();
    control.handle_command(
        AppCommand::SelectCharacteristic { group: 0, child: 0 },
        &mut gatt,
        &mut sink,
    );
    gatt.calls.clear();

    control.handle_command(
        AppCommand::SelectCharacteristic { group: 1, child: 0 },
        &mut gatt,
        &mut sink,
    );

    assert_eq!(gatt.notifications(), vec![(DEFAULT_NOTIFY_CHAR_UUID, true)]);
    assert_eq!(
        control.notify_characteristic().map(|c| c.uuid),
        Some(DEFAULT_NOTIFY_CHAR_UUID)
    );
}

#[test]
fn selecting_readable_entry_without_subscription_does_nothing() {
    let (mut control, mut gatt, mut sink) = connected();
    control.handle_command(
        AppCommand::SelectCharacteristic { group: 0, child: 0 },
        &mut gatt,
        &mut sink,
    );
    gatt.calls.clear();

    control.handle_command(
        AppCommand::SelectCharacteristic { group: 0, child: 0 },
        &mut gatt,
        &mut sink,
    );

    assert!(gatt.calls.is_empty());
    assert_eq!(control.services()[0].characteristics[0].uuid, BATTERY_LEVEL);
}

#[test]
fn out_of_range_selection_is_ignored() {
    let (mut control, mut gatt, mut sink) = connected();

    control.handle_command(
        AppCommand::SelectCharacteristic { group: 5, child: 0 },
        &mut gatt,
        &mut sink,
    );
    control.handle_command(
        AppCommand::SelectCharacteristic { group: 1, child: 9 },
        &mut gatt,
        &mut sink,
    );

    assert!(gatt.calls.is_empty());
    assert!(control.notify_characteristic().is_some());
}

// ── End to end with the simulated board ───────────────────────

fn pump(control: &mut DeviceControl, sim: &mut SimulatedBms, sink: &mut RecordingSink) {
    loop {
        let events = sim.drain_events();
        if events.is_empty() {
            break;
        }
        for e in events {
            control.handle_event(e, sim, sink);
        }
    }
}

#[test]
fn simulated_board_answers_cell_voltage_request() {
    let mut control = DeviceControl::new(&config());
    let mut sim = SimulatedBms::new();
    let mut sink = RecordingSink::new();

    control.bind(&mut sim, &mut sink).unwrap();
    pump(&mut control, &mut sim, &mut sink);
    assert!(control.is_connected());
    assert!(sim.is_notifying(DEFAULT_NOTIFY_CHAR_UUID));

    control.handle_command(AppCommand::SendRequest(Opcode::CELL_VOLTAGES), &mut sim, &mut sink);
    pump(&mut control, &mut sim, &mut sink);

    // The read-back echoes the request first; the notified reply lands last.
    let reply = "0x04 (cell-voltages) ok len=8: 0D 05 0D 07 0D 02 0D 06";
    let echo_at = sink
        .events
        .iter()
        .position(|e| *e == AppEvent::DataChanged("DD A5 04 00 FF FC 77".into()))
        .unwrap();
    let reply_at = sink
        .events
        .iter()
        .position(|e| *e == AppEvent::DataChanged(reply.into()))
        .unwrap();
    assert!(echo_at < reply_at);
    assert_eq!(control.data(), reply);
    assert_eq!(control.requests_sent(), 1);
}

#[test]
fn simulated_link_loss_resets_view() {
    let mut control = DeviceControl::new(&config());
    let mut sim = SimulatedBms::new();
    let mut sink = RecordingSink::new();
    control.bind(&mut sim, &mut sink).unwrap();
    pump(&mut control, &mut sim, &mut sink);
    control.handle_command(AppCommand::SendRequest(Opcode::BASIC_INFO), &mut sim, &mut sink);
    pump(&mut control, &mut sim, &mut sink);
    assert_ne!(control.data(), NO_DATA);

    sim.drop_link();
    pump(&mut control, &mut sim, &mut sink);

    assert!(!control.is_connected());
    assert_eq!(control.data(), NO_DATA);
    assert!(control.notify_characteristic().is_none());

    control.resume(&mut sim);
    pump(&mut control, &mut sim, &mut sink);
    assert!(control.is_connected());
    assert!(sim.is_notifying(DEFAULT_NOTIFY_CHAR_UUID));
}
