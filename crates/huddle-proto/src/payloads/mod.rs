//! CBOR-encoded event payloads.
//!
//! The frame header names the event; the payload carries its data as CBOR.
//! Only the inner struct is serialized, never a variant tag, so the opcode is
//! the single source of truth for what a payload means.
//!
//! Decoding validates shape as well as syntax. A roster with duplicate
//! connections or a message with empty text fails here, before any state
//! machine sees it.

pub mod chat;
pub mod presence;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// Typed payload for every event in the protocol.
///
/// # Invariants
///
/// - Each variant maps to exactly one [`Opcode`] (exhaustive `match`).
/// - Decoding an encoded payload with the same opcode yields an equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Relay welcome on accept
    Greeting(session::Greeting),
    /// Participant asks to join
    LoginRequest(session::LoginRequest),
    /// Login accepted, with the full roster
    LoginAck(presence::Roster),
    /// Membership changed, with the full roster
    RosterChanged(presence::Roster),
    /// Participant asks for a broadcast
    SendMessage(chat::SendMessage),
    /// Message from another participant
    MessageDelivered(chat::ChatMessage),
    /// Request rejected
    Error(ErrorPayload),
}

/// Body of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable reason
    pub code: u16,
    /// Human-readable reason
    pub message: String,
}

impl ErrorPayload {
    /// Frame could not be decoded or failed validation.
    pub const INVALID_PAYLOAD: u16 = 0x0001;
    /// Request requires a completed login.
    pub const NOT_LOGGED_IN: u16 = 0x0002;
    /// Connection already completed a login.
    pub const ALREADY_LOGGED_IN: u16 = 0x0003;
    /// Username is empty or whitespace.
    pub const INVALID_USERNAME: u16 = 0x0004;
    /// Event may only be sent by the relay.
    pub const UNEXPECTED_EVENT: u16 = 0x0005;
    /// Relay is at its connection limit.
    pub const RELAY_FULL: u16 = 0x0006;
    /// Username exceeds [`LoginRequest::MAX_USERNAME_LEN`](session::LoginRequest::MAX_USERNAME_LEN).
    pub const USERNAME_TOO_LONG: u16 = 0x0007;

    /// Create an error with an explicit code.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Frame could not be decoded.
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PAYLOAD, reason)
    }

    /// Sender has not logged in.
    pub fn not_logged_in() -> Self {
        Self::new(Self::NOT_LOGGED_IN, "not logged in")
    }

    /// Sender already logged in.
    pub fn already_logged_in() -> Self {
        Self::new(Self::ALREADY_LOGGED_IN, "already logged in")
    }

    /// Username rejected.
    pub fn invalid_username() -> Self {
        Self::new(Self::INVALID_USERNAME, "username must not be blank")
    }

    /// Client sent an event only the relay may send.
    pub fn unexpected_event(opcode: Opcode) -> Self {
        Self::new(Self::UNEXPECTED_EVENT, format!("{opcode} is relay-only"))
    }

    /// Relay refused the connection.
    pub fn relay_full(max_connections: usize) -> Self {
        Self::new(Self::RELAY_FULL, format!("relay is full ({max_connections} connections)"))
    }

    /// Roster has grown past what one frame can carry.
    pub fn roster_full() -> Self {
        Self::new(Self::RELAY_FULL, "roster is too large to join")
    }

    /// Username longer than the relay accepts.
    pub fn username_too_long(max: usize) -> Self {
        Self::new(Self::USERNAME_TOO_LONG, format!("username exceeds {max} bytes"))
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Greeting(_) => Opcode::Greeting,
            Self::LoginRequest(_) => Opcode::LoginRequest,
            Self::LoginAck(_) => Opcode::LoginAck,
            Self::RosterChanged(_) => Opcode::RosterChanged,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::MessageDelivered(_) => Opcode::MessageDelivered,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode the inner value as CBOR.
    ///
    /// Does not enforce [`FrameHeader::MAX_PAYLOAD_SIZE`];
    /// [`Payload::into_frame`] and [`Frame::encode`] do.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Greeting(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LoginRequest(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LoginAck(inner) | Self::RosterChanged(inner) => {
                ciborium::ser::into_writer(inner, &mut writer)
            },
            Self::SendMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::MessageDelivered(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode and validate a payload for the given opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if `bytes` exceed the frame limit
    /// - `ProtocolError::CborDecode` if the CBOR does not match the event
    /// - `ProtocolError::InvalidPayload` if the value violates the protocol
    ///   (blank username, duplicate roster entry, empty message)
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Greeting => Self::Greeting(from_cbor(bytes)?),
            Opcode::LoginRequest => Self::LoginRequest(from_cbor(bytes)?),
            Opcode::LoginAck => Self::LoginAck(from_cbor::<presence::Roster>(bytes)?.validated()?),
            Opcode::RosterChanged => {
                Self::RosterChanged(from_cbor::<presence::Roster>(bytes)?.validated()?)
            },
            Opcode::SendMessage => {
                let request: chat::SendMessage = from_cbor(bytes)?;
                request.message.validate()?;
                Self::SendMessage(request)
            },
            Opcode::MessageDelivered => {
                let message: chat::ChatMessage = from_cbor(bytes)?;
                message.validate()?;
                Self::MessageDelivered(message)
            },
            Opcode::Error => Self::Error(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Encode into a complete frame with the matching opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::PayloadTooLarge` if the encoded payload exceeds
    ///   [`FrameHeader::MAX_PAYLOAD_SIZE`]
    pub fn into_frame(self) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;

        let max = FrameHeader::MAX_PAYLOAD_SIZE as usize;
        if buf.len() > max {
            return Err(ProtocolError::PayloadTooLarge { size: buf.len(), max });
        }

        Ok(Frame::new(FrameHeader::new(self.opcode()), buf))
    }

    /// Decode the payload carried by a frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header names no known event
    /// - any error from [`Payload::decode`]
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn from_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
