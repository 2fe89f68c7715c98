//! Frame header with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 12-byte structure serialized as raw binary
//! (big endian). The relay reads the opcode straight out of the network
//! buffer to decide how to route a frame.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 12-byte frame header (big endian network byte order).
///
/// Fields are stored as byte arrays so the struct has alignment 1 and every
/// 12-byte pattern is a valid value; casting untrusted network bytes cannot
/// produce an invalid header, only one that fails [`FrameHeader::from_bytes`]
/// validation.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],                   // 0x4855444C ("HUDL")
    version: u8,                      // 0x01
    flags: u8,                        // reserved, zero
    pub(crate) opcode: [u8; 2],       // u16 event name
    pub(crate) payload_size: [u8; 4], // u32 payload length
}

impl FrameHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 12;

    /// Magic number: "HUDL" in ASCII.
    pub const MAGIC: u32 = 0x4855_444C;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB). Rosters and chat lines are small; this
    /// bounds what a peer can make us allocate.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a header for the given event with an empty payload.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            payload_size: [0; 4],
        }
    }

    /// Parse a header from the front of a network buffer (zero-copy).
    ///
    /// Trailing bytes after the header are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::InvalidMagic` if the magic number is wrong
    /// - `ProtocolError::UnsupportedVersion` if the version is not ours
    /// - `ProtocolError::PayloadTooLarge` if the announced payload is too big
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = header.payload_size();
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(self.as_bytes());
        arr
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcode = self.opcode_enum().map_or("unknown", Opcode::event_name);
        f.debug_struct("FrameHeader")
            .field("version", &self.version)
            .field("opcode", &opcode)
            .field("payload_size", &self.payload_size())
            .finish()
    }
}
