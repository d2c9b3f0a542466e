//! Board wire protocol.
//!
//! ```text
//!   controller ──▶ CommandFrame (7 B) ──▶ write characteristic
//!   notify characteristic ──▶ ResponseDecoder ──▶ ResponseFrame
//! ```

pub mod decoder;
pub mod frame;

pub use decoder::{ResponseDecoder, ResponseFrame};
pub use frame::{CommandFrame, FrameError, Opcode};

/// Render bytes as spaced upper-case hex (`DD A5 03`).
pub fn hex(bytes: &[u8]) -> String {
    use core::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}
