//! Text view adapter.
//!
//! Renders the controller's view state (title, connection state, data
//! field, notices) as plain lines on any [`Write`] target.  Write errors
//! are logged and otherwise ignored; the view never stops the session.

use std::io::Write;

use log::warn;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::app::service::NO_DATA;

pub struct ConsoleView<W: Write> {
    out: W,
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: core::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{}", args).and_then(|()| self.out.flush()) {
            warn!("console write failed: {}", e);
        }
    }
}

impl<W: Write> EventSink for ConsoleView<W> {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { name, address } => match name {
                Some(name) => self.line(format_args!("== {} [{}]", name, address)),
                None => self.line(format_args!("== {}", address)),
            },
            AppEvent::ConnectionChanged { connected } => {
                let state = if *connected { "Connected" } else { "Disconnected" };
                self.line(format_args!("state: {}", state));
            }
            AppEvent::DataChanged(text) => self.line(format_args!("data: {}", text)),
            AppEvent::DataCleared => self.line(format_args!("data: {}", NO_DATA)),
            AppEvent::ServicesListed {
                services,
                characteristics,
            } => self.line(format_args!(
                "services: {} ({} characteristics)",
                services, characteristics
            )),
            AppEvent::Notice(text) => self.line(format_args!("* {}", text)),
        }
    }
}
