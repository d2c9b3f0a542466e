//! Fuzz target: `CommandFrame::parse`
//!
//! Anything the parser accepts must be exactly the request `read` builds
//! for the same opcode.
//!
//! cargo fuzz run fuzz_command_frame

#![no_main]

use bmslink::protocol::CommandFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = CommandFrame::parse(data) {
        assert_eq!(frame, CommandFrame::read(frame.opcode()));
        assert_eq!(frame.as_bytes(), data);
    }
});
