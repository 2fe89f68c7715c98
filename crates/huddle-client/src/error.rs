//! Session errors.

use huddle_core::ChannelError;
use huddle_proto::ProtocolError;
use thiserror::Error;

/// Why an outbound action was refused or failed.
///
/// Precondition variants leave [`SessionState`](crate::SessionState)
/// untouched and transmit nothing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Channel is not open yet.
    #[error("not connected")]
    NotConnected,

    /// Connected, but the relay has not greeted us yet.
    #[error("waiting for the relay greeting")]
    AwaitingGreeting,

    /// Login already acknowledged.
    #[error("already logged in")]
    AlreadyLoggedIn,

    /// Sending requires a completed login.
    #[error("not logged in")]
    NotLoggedIn,

    /// Username is empty or whitespace.
    #[error("username must not be blank")]
    EmptyUsername,

    /// Username is longer than the relay accepts.
    #[error("username exceeds {max} bytes")]
    UsernameTooLong {
        /// Maximum allowed length in bytes
        max: usize,
    },

    /// Message text is empty.
    #[error("message must not be empty")]
    EmptyMessage,

    /// Session was closed.
    #[error("session closed")]
    Closed,

    /// Channel failed while transmitting.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Outbound event could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
