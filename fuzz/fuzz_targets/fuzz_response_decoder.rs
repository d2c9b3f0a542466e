//! Fuzz target: `ResponseDecoder::feed`
//!
//! The first input byte picks a chunk size; the rest is streamed through
//! the decoder in chunks of that size.  Every frame it accepts must
//! re-encode to bytes that decode to the same frame.
//!
//! cargo fuzz run fuzz_response_decoder

#![no_main]

use bmslink::protocol::ResponseDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(first % 32) + 1;

    let mut decoder = ResponseDecoder::new();
    let mut frames = Vec::new();
    for piece in rest.chunks(chunk) {
        decoder.feed(piece, |r| {
            if let Ok(frame) = r {
                frames.push(frame);
            }
        });
    }

    for frame in frames {
        let mut again = ResponseDecoder::new();
        let mut seen = 0;
        again.feed(&frame.encode(), |r| {
            assert_eq!(r.as_ref(), Ok(&frame));
            seen += 1;
        });
        assert_eq!(seen, 1);
    }
});
