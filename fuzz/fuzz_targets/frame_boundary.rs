//! Fuzz target for frame header boundary conditions
//!
//! # Strategy
//!
//! - Magic: valid, off-by-one, zeros, random
//! - Version: valid, zero, random
//! - Payload size: zero, at max, just over max, `u32::MAX`, random
//!
//! # Invariants
//!
//! - `payload_size > MAX_PAYLOAD_SIZE` MUST return `PayloadTooLarge`
//! - Invalid magic MUST return `InvalidMagic`
//! - A header announcing more bytes than present MUST return `FrameTruncated`
//! - No input panics

#![no_main]

use arbitrary::Arbitrary;
use huddle_proto::{Frame, FrameHeader, ProtocolError};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct BoundaryFrame {
    magic: Magic,
    version: Version,
    flags: u8,
    opcode: u16,
    payload_size: PayloadSize,
    body: Vec<u8>,
}

#[derive(Debug, Arbitrary)]
enum Magic {
    Valid,
    OffByOne(u8),
    Zeros,
    Random([u8; 4]),
}

#[derive(Debug, Arbitrary)]
enum Version {
    Valid,
    Zero,
    Random(u8),
}

#[derive(Debug, Arbitrary)]
enum PayloadSize {
    Zero,
    BodyLength,
    AtMax,
    JustOverMax,
    Max,
    Random(u32),
}

impl BoundaryFrame {
    fn magic_bytes(&self) -> [u8; 4] {
        match &self.magic {
            Magic::Valid => FrameHeader::MAGIC.to_be_bytes(),
            Magic::OffByOne(at) => {
                let mut bytes = FrameHeader::MAGIC.to_be_bytes();
                let index = usize::from(*at) % 4;
                bytes[index] = bytes[index].wrapping_add(1);
                bytes
            },
            Magic::Zeros => [0; 4],
            Magic::Random(bytes) => *bytes,
        }
    }

    fn version_byte(&self) -> u8 {
        match self.version {
            Version::Valid => FrameHeader::VERSION,
            Version::Zero => 0,
            Version::Random(v) => v,
        }
    }

    fn payload_size(&self) -> u32 {
        match self.payload_size {
            PayloadSize::Zero => 0,
            PayloadSize::BodyLength => u32::try_from(self.body.len()).unwrap_or(u32::MAX),
            PayloadSize::AtMax => FrameHeader::MAX_PAYLOAD_SIZE,
            PayloadSize::JustOverMax => FrameHeader::MAX_PAYLOAD_SIZE + 1,
            PayloadSize::Max => u32::MAX,
            PayloadSize::Random(size) => size,
        }
    }

    fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(FrameHeader::SIZE + self.body.len());
        wire.extend_from_slice(&self.magic_bytes());
        wire.push(self.version_byte());
        wire.push(self.flags);
        wire.extend_from_slice(&self.opcode.to_be_bytes());
        wire.extend_from_slice(&self.payload_size().to_be_bytes());
        wire.extend_from_slice(&self.body);
        wire
    }
}

fuzz_target!(|input: BoundaryFrame| {
    let wire = input.to_wire();
    let result = Frame::decode(&wire);

    let magic_ok = input.magic_bytes() == FrameHeader::MAGIC.to_be_bytes();
    let version_ok = input.version_byte() == FrameHeader::VERSION;
    let size = input.payload_size();

    if !magic_ok {
        assert_eq!(result, Err(ProtocolError::InvalidMagic));
    } else if !version_ok {
        assert_eq!(result, Err(ProtocolError::UnsupportedVersion(input.version_byte())));
    } else if size > FrameHeader::MAX_PAYLOAD_SIZE {
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    } else if size as usize > input.body.len() {
        assert!(matches!(result, Err(ProtocolError::FrameTruncated { .. })));
    } else {
        let frame = result.expect("well-formed frame decodes");
        assert_eq!(frame.payload.len(), size as usize);
        assert_eq!(frame.header.opcode(), input.opcode);
    }
});
