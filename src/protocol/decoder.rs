//! Streaming response decoder.
//!
//! Wire format of a board response:
//! ```text
//! ┌──────┬─────┬────────┬─────┬──────────────┬──────────────┬──────┐
//! │ 0xDD │ cmd │ status │ len │ data (len B) │ checksum (BE)│ 0x77 │
//! └──────┴─────┴────────┴─────┴──────────────┴──────────────┴──────┘
//! ```
//!
//! The checksum covers `status`, `len` and `data`.  Responses arrive as
//! GATT notifications, which on a default MTU carry at most 20 bytes, so
//! a single frame is usually split across several chunks.  The decoder
//! buffers bytes and yields every frame a chunk completes.
//!
//! Every `0xDD` is only a candidate preamble.  A candidate that fails
//! validation is reported and the scan restarts one byte after it, so a
//! stray `0xDD` never hides the frames behind it.  A candidate whose
//! claimed length runs past the buffered bytes is dropped as soon as a
//! complete, valid frame shows up further along.

use core::fmt;

use log::debug;

use super::frame::{END, FrameError, Opcode, START, checksum};

/// `len` is a single byte, so a payload never exceeds this.
pub const MAX_PAYLOAD: usize = 255;

/// `cmd`, `status`, `len`.
const HEADER_SIZE: usize = 3;
/// Checksum (2B) + terminator.
const TRAILER_SIZE: usize = 3;
/// Preamble through terminator of the largest frame.
pub const MAX_FRAME: usize = 1 + HEADER_SIZE + MAX_PAYLOAD + TRAILER_SIZE;
/// Room for one partial frame plus the chunk that follows it.
const BUFFER_SIZE: usize = 2 * MAX_FRAME;

/// What the bytes at a candidate preamble amount to.
enum Candidate {
    /// A whole frame is buffered; `usize` is its wire length.
    Complete(Result<ResponseFrame, FrameError>, usize),
    /// More bytes needed; `usize` is the length the header claims.
    Incomplete(usize),
}

/// A validated response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub command: Opcode,
    pub status: u8,
    pub payload: heapless::Vec<u8, MAX_PAYLOAD>,
}

impl ResponseFrame {
    /// Returns `None` if `payload` exceeds [`MAX_PAYLOAD`].
    pub fn new(command: Opcode, status: u8, payload: &[u8]) -> Option<Self> {
        let payload = heapless::Vec::from_slice(payload).ok()?;
        Some(Self {
            command,
            status,
            payload,
        })
    }

    /// Board reports success.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Serialise back to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len() as u8;
        let mut body = Vec::with_capacity(2 + self.payload.len());
        body.push(self.status);
        body.push(len);
        body.extend_from_slice(&self.payload);

        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len() + TRAILER_SIZE + 1);
        out.push(START);
        out.push(self.command.0);
        out.extend_from_slice(&body);
        out.extend_from_slice(&checksum(&body).to_be_bytes());
        out.push(END);
        out
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.command)?;
        if self.is_ok() {
            f.write_str("ok")?;
        } else {
            write!(f, "status=0x{:02X}", self.status)?;
        }
        write!(f, " len={}", self.payload.len())?;
        if !self.payload.is_empty() {
            write!(f, ": {}", super::hex(&self.payload))?;
        }
        Ok(())
    }
}

/// Streaming frame decoder.
pub struct ResponseDecoder {
    buf: heapless::Vec<u8, BUFFER_SIZE>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
        }
    }

    /// Feed one chunk into the decoder.
    ///
    /// `on_frame` runs once for every frame this chunk completes, in wire
    /// order.  A candidate that fails validation is reported as `Err` and
    /// the scan resumes at the byte after its preamble.
    pub fn feed(&mut self, mut data: &[u8], mut on_frame: impl FnMut(Result<ResponseFrame, FrameError>)) {
        while !data.is_empty() {
            // After `drain` at most one partial frame is left, so there is
            // always room for more.
            let room = BUFFER_SIZE - self.buf.len();
            let (head, rest) = data.split_at(room.min(data.len()));
            let _ = self.buf.extend_from_slice(head);
            data = rest;
            self.drain(&mut on_frame);
        }
    }

    /// Drop any partially received frame (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn drain(&mut self, on_frame: &mut impl FnMut(Result<ResponseFrame, FrameError>)) {
        loop {
            match self.buf.iter().position(|&b| b == START) {
                None => {
                    if !self.buf.is_empty() {
                        debug!("decoder: skipped {} stray byte(s)", self.buf.len());
                        self.buf.clear();
                    }
                    return;
                }
                Some(0) => {}
                Some(skip) => {
                    debug!("decoder: skipped {} stray byte(s)", skip);
                    self.discard(skip);
                }
            }

            match candidate(&self.buf) {
                Candidate::Complete(Ok(frame), len) => {
                    on_frame(Ok(frame));
                    self.discard(len);
                }
                Candidate::Complete(Err(e), _) => {
                    on_frame(Err(e));
                    self.discard(1);
                }
                Candidate::Incomplete(expected) => {
                    let Some(next) = self.next_valid_frame() else {
                        return;
                    };
                    on_frame(Err(FrameError::BadLength {
                        expected,
                        actual: next,
                    }));
                    self.discard(next);
                }
            }
        }
    }

    /// Offset of the first later preamble that starts a complete, valid frame.
    fn next_valid_frame(&self) -> Option<usize> {
        (1..self.buf.len()).find(|&i| {
            self.buf[i] == START && matches!(candidate(&self.buf[i..]), Candidate::Complete(Ok(_), _))
        })
    }

    fn discard(&mut self, n: usize) {
        let len = self.buf.len();
        self.buf.copy_within(n..len, 0);
        self.buf.truncate(len - n);
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Inspect the bytes at a preamble (`buf[0] == START`).
fn candidate(buf: &[u8]) -> Candidate {
    if buf.len() < 1 + HEADER_SIZE {
        return Candidate::Incomplete(1 + HEADER_SIZE + TRAILER_SIZE);
    }
    let len = buf[3] as usize;
    let total = 1 + HEADER_SIZE + len + TRAILER_SIZE;
    if buf.len() < total {
        return Candidate::Incomplete(total);
    }

    let body = &buf[2..1 + HEADER_SIZE + len];
    let trailer = &buf[1 + HEADER_SIZE + len..total];
    if trailer[2] != END {
        return Candidate::Complete(Err(FrameError::BadEnd(trailer[2])), total);
    }
    let expected = checksum(body);
    let actual = u16::from_be_bytes([trailer[0], trailer[1]]);
    if expected != actual {
        return Candidate::Complete(Err(FrameError::BadChecksum { expected, actual }), total);
    }

    let frame = ResponseFrame::new(Opcode(buf[1]), buf[2], &body[2..]).ok_or(FrameError::BadLength {
        expected: MAX_PAYLOAD,
        actual: len,
    });
    Candidate::Complete(frame, total)
}
