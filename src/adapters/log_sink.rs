//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing controller events to the `log`
//! facade, so a session leaves a trace even when nothing is rendered.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { name, address } => {
                info!("START | device={} name={}", address, name.as_deref().unwrap_or("-"));
            }
            AppEvent::ConnectionChanged { connected } => {
                info!("LINK  | {}", if *connected { "connected" } else { "disconnected" });
            }
            AppEvent::DataChanged(text) => {
                info!("DATA  | {}", text);
            }
            AppEvent::DataCleared => {
                info!("DATA  | cleared");
            }
            AppEvent::ServicesListed {
                services,
                characteristics,
            } => {
                info!("GATT  | {} service(s), {} characteristic(s)", services, characteristics);
            }
            AppEvent::Notice(text) => {
                info!("NOTE  | {}", text);
            }
        }
    }
}
