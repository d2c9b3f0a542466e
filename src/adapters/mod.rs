//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements  | Connects to                     |
//! |---------------|-------------|---------------------------------|
//! | `btle`        | GattPort    | Host Bluetooth stack (btleplug) |
//! | `sim`         | GattPort    | In-memory battery board         |
//! | `config_file` | ConfigPort  | JSON file on disk               |
//! | `console`     | EventSink   | Terminal control screen         |
//! | `log_sink`    | EventSink   | `log` output                    |

#[cfg(feature = "btle")]
pub mod btle;
pub mod config_file;
pub mod console;
pub mod log_sink;
pub mod sim;
pub(crate) mod utils;
