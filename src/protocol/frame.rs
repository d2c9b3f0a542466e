//! Outbound command frames.
//!
//! Wire format of a read request:
//! ```text
//! ┌──────┬──────┬────────┬─────┬──────────────┬──────┐
//! │ 0xDD │ 0xA5 │ opcode │ len │ checksum (BE)│ 0x77 │
//! │ (1B) │ (1B) │ (1B)   │ (1B)│ (2B)         │ (1B) │
//! └──────┴──────┴────────┴─────┴──────────────┴──────┘
//! ```
//!
//! The checksum is the 16-bit two's complement of the byte sum of
//! `opcode`, `len` and any data bytes.  Read requests carry no data, so
//! `len` is zero and the whole frame is always 7 bytes.

use core::fmt;

/// Frame preamble.
pub const START: u8 = 0xDD;
/// Marker byte for a read request.
pub const READ: u8 = 0xA5;
/// Frame terminator.
pub const END: u8 = 0x77;
/// Total size of a read request.
pub const COMMAND_FRAME_LEN: usize = 7;

/// Register selector carried in byte 2 of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u8);

impl Opcode {
    /// Pack voltage, current, capacity and protection state.
    pub const BASIC_INFO: Self = Self(0x03);
    /// Per-cell voltages.
    pub const CELL_VOLTAGES: Self = Self(0x04);
    /// Vendor extended block.
    pub const EXTENDED_INFO: Self = Self(0x12);

    /// The three requests the controller exposes, in button order.
    pub const PRESETS: [Self; 3] = [Self::BASIC_INFO, Self::CELL_VOLTAGES, Self::EXTENDED_INFO];

    /// Short human label, `None` for registers without a name.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::BASIC_INFO => Some("basic-info"),
            Self::CELL_VOLTAGES => Some("cell-voltages"),
            Self::EXTENDED_INFO => Some("extended-info"),
            _ => None,
        }
    }

    /// Parse a label (`basic-info`) or a hex byte (`03`, `0x12`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(op) = Self::PRESETS.iter().find(|op| op.label() == Some(s)) {
            return Some(*op);
        }
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u8::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "0x{:02X} ({})", self.0, label),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// Errors raised while validating request or response frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Input length does not match the frame layout.
    BadLength { expected: usize, actual: usize },
    /// First byte is not [`START`].
    BadStart(u8),
    /// Second byte of a request is not [`READ`].
    BadMarker(u8),
    /// Last byte is not [`END`].
    BadEnd(u8),
    /// Trailing checksum does not match the body.
    BadChecksum { expected: u16, actual: u16 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength { expected, actual } => {
                write!(f, "frame length {actual}, expected {expected}")
            }
            Self::BadStart(b) => write!(f, "bad preamble 0x{b:02X}"),
            Self::BadMarker(b) => write!(f, "bad request marker 0x{b:02X}"),
            Self::BadEnd(b) => write!(f, "bad terminator 0x{b:02X}"),
            Self::BadChecksum { expected, actual } => {
                write!(f, "checksum 0x{actual:04X}, expected 0x{expected:04X}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Two's complement of the byte sum of `body`.
pub fn checksum(body: &[u8]) -> u16 {
    let sum = body
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    0u16.wrapping_sub(sum)
}

/// A complete, validated 7-byte read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    bytes: [u8; COMMAND_FRAME_LEN],
}

impl CommandFrame {
    /// Build the read request for `opcode`.
    pub fn read(opcode: Opcode) -> Self {
        let [hi, lo] = checksum(&[opcode.0, 0]).to_be_bytes();
        Self {
            bytes: [START, READ, opcode.0, 0x00, hi, lo, END],
        }
    }

    /// Validate raw bytes as a read request.
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        let bytes: [u8; COMMAND_FRAME_LEN] =
            raw.try_into().map_err(|_| FrameError::BadLength {
                expected: COMMAND_FRAME_LEN,
                actual: raw.len(),
            })?;

        if bytes[0] != START {
            return Err(FrameError::BadStart(bytes[0]));
        }
        if bytes[1] != READ {
            return Err(FrameError::BadMarker(bytes[1]));
        }
        if bytes[6] != END {
            return Err(FrameError::BadEnd(bytes[6]));
        }
        // Read requests never carry data.
        if bytes[3] != 0 {
            return Err(FrameError::BadLength {
                expected: COMMAND_FRAME_LEN,
                actual: COMMAND_FRAME_LEN + bytes[3] as usize,
            });
        }

        let expected = checksum(&bytes[2..4]);
        let actual = u16::from_be_bytes([bytes[4], bytes[5]]);
        if expected != actual {
            return Err(FrameError::BadChecksum { expected, actual });
        }

        Ok(Self { bytes })
    }

    pub fn opcode(&self) -> Opcode {
        Opcode(self.bytes[2])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::hex(&self.bytes))
    }
}
