//! Event channel errors.

use huddle_proto::ProtocolError;
use thiserror::Error;

/// Errors raised by an [`EventChannel`](crate::EventChannel) or the frame
/// I/O helpers in [`wire`](crate::wire).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Channel has not been opened yet.
    #[error("channel is not open")]
    NotOpen,

    /// Channel was closed, locally or by the peer.
    #[error("channel is closed")]
    Closed,

    /// Could not establish the underlying connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Underlying stream failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Peer sent bytes that are not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
