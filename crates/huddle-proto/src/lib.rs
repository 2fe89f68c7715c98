//! Huddle wire protocol.
//!
//! Every event exchanged between a participant and the relay travels as a
//! [`Frame`]: a fixed 12-byte binary [`FrameHeader`] naming the event
//! ([`Opcode`]) followed by a CBOR-encoded [`Payload`].
//!
//! The header is raw big-endian binary so the relay can route by event name
//! without touching the payload. Payloads use CBOR for type safety and
//! forward compatibility.
//!
//! # Events
//!
//! | Direction | Event | Payload |
//! |---|---|---|
//! | relay → client | `greeting` | [`Greeting`] |
//! | client → relay | `login-request` | [`LoginRequest`] |
//! | relay → client | `login-ack` | [`Roster`] |
//! | relay → client | `roster-changed` | [`Roster`] |
//! | client → relay | `send-message` | [`SendMessage`] |
//! | relay → client | `message-delivered` | [`ChatMessage`] |
//! | relay → client | `error` | [`ErrorPayload`] |

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{
    ErrorPayload, Payload,
    chat::{ChatMessage, SendMessage},
    presence::{ConnectionId, Participant, Roster},
    session::{Greeting, LoginRequest},
};
