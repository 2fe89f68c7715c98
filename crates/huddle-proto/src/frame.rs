//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet:
//! - 12-byte raw binary header (big endian)
//! - variable-length payload bytes (already CBOR-encoded)
//!
//! This is a pure data holder. For typed events see
//! [`Payload::into_frame`](crate::Payload::into_frame) and
//! [`Payload::from_frame`](crate::Payload::from_frame).

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame.
///
/// Layout on the wire: `[FrameHeader: 12 bytes] + [payload: variable]`.
///
/// # Invariants
///
/// - `payload.len()` matches `header.payload_size()`. Enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` does not exceed [`FrameHeader::MAX_PAYLOAD_SIZE`].
///   Oversized frames are rejected by [`Frame::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,

    /// Raw payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame, setting the header's payload size from `payload`.
    ///
    /// Does not validate the size limit so tests can build oversized frames;
    /// [`Frame::encode`] rejects them.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // Lengths past u32::MAX saturate; encode() rejects them long before.
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        header.payload_size = payload_len.to_be_bytes();

        Self { header, payload }
    }

    /// Total encoded length (header + payload).
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode frame into buffer.
    ///
    /// Writes `[header] + [payload]`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if the payload exceeds
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire bytes.
    ///
    /// Does not deserialize the payload. Trailing bytes past the announced
    /// payload are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError` if header validation fails
    /// - `ProtocolError::FrameTruncated` if the payload is shorter than the
    ///   header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let total_size = FrameHeader::SIZE + payload_size;

        let payload = bytes.get(FrameHeader::SIZE..total_size).ok_or(
            ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            },
        )?;

        Ok(Self { header: *header, payload: Bytes::copy_from_slice(payload) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;

    #[test]
    fn frame_sets_payload_size() {
        let frame = Frame::new(FrameHeader::new(Opcode::Greeting), vec![1, 2, 3, 4]);
        assert_eq!(frame.header.payload_size(), 4);
        assert_eq!(frame.encoded_len(), FrameHeader::SIZE + 4);

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(frame, parsed);
    }

    #[test]
    fn reject_truncated_frame() {
        let frame = Frame::new(FrameHeader::new(Opcode::SendMessage), vec![0u8; 100]);
        let header_bytes = frame.header.to_bytes();

        let result = Frame::decode(&header_bytes);
        assert_eq!(result, Err(ProtocolError::FrameTruncated { expected: 100, actual: 0 }));
    }

    #[test]
    fn reject_oversized_encode() {
        let payload = vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1];
        let frame = Frame::new(FrameHeader::new(Opcode::SendMessage), payload);

        let mut wire = Vec::new();
        assert!(matches!(frame.encode(&mut wire), Err(ProtocolError::PayloadTooLarge { .. })));
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let frame = Frame::new(FrameHeader::new(Opcode::Greeting), vec![9, 9]);
        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("should encode");
        wire.extend_from_slice(&[0xAA; 7]);

        let parsed = Frame::decode(&wire).expect("should decode");
        assert_eq!(parsed.payload.as_ref(), &[9, 9]);
    }
}
