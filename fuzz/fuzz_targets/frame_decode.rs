//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes must never panic the frame parser. Every successful decode
//! must re-encode to the exact bytes it consumed.

#![no_main]

use huddle_proto::{Frame, FrameHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let consumed = FrameHeader::SIZE + frame.header.payload_size() as usize;
    assert_eq!(frame.encoded_len(), consumed);

    let mut wire = Vec::new();
    frame.encode(&mut wire).expect("decoded frame re-encodes");
    assert_eq!(wire.as_slice(), &data[..consumed]);
});
