//! Fuzz target for Payload::from_frame
//!
//! Feeds arbitrary CBOR under every opcode: malformed CBOR, the wrong payload
//! shape for the opcode, oversized strings, rosters with duplicate IDs.
//! Decoding must never panic, and anything that decodes must validate and
//! survive a second round through the encoder.

#![no_main]

use bytes::Bytes;
use huddle_proto::{Frame, FrameHeader, Opcode, Payload, ProtocolError};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for opcode in Opcode::ALL {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));

        let Ok(payload) = Payload::from_frame(&frame) else {
            continue;
        };
        assert_eq!(payload.opcode(), opcode);

        let reencoded = match payload.clone().into_frame() {
            Ok(frame) => frame,
            // Canonical re-encoding may land just past the limit.
            Err(ProtocolError::PayloadTooLarge { .. }) => continue,
            Err(e) => panic!("valid payload failed to encode: {e}"),
        };
        let again = Payload::from_frame(&reencoded).expect("encoded payload decodes");
        assert_eq!(again, payload);
    }
});
