//! Inbound commands to the device controller.
//!
//! These represent user actions (menu items, request buttons, list
//! selection) that the [`DeviceControl`](super::service::DeviceControl)
//! interprets and acts upon.

use crate::protocol::Opcode;

/// Commands the front end can send into the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Menu: connect to the configured device.
    Connect,

    /// Menu: drop the connection.
    Disconnect,

    /// Send the read request for `Opcode` and read the reply back.
    SendRequest(Opcode),

    /// Pick entry `child` of discovered service `group`.
    SelectCharacteristic { group: usize, child: usize },
}
