//! Protocol errors.
//!
//! Everything that can go wrong turning bytes into events: framing problems
//! (short buffers, bad magic, oversized payloads), CBOR failures, and payloads
//! that decode but violate the protocol's shape (duplicate roster entries,
//! empty messages).

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or validating frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than a frame header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Buffer holds a header but not the full payload it announces.
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size claimed by the header
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Header magic does not identify a Huddle frame.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Header carries a protocol version we do not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds [`crate::FrameHeader::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Offending payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Opcode is not part of the protocol.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// Payload decoded but violates the protocol's shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
