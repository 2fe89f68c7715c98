//! Synchronizer inputs and outputs.

use huddle_proto::{ChatMessage, Frame, Roster};

/// Inbound events for the [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Channel finished opening.
    ChannelOpened,
    /// Channel closed, locally or by the relay.
    ChannelClosed,
    /// Frame arrived from the relay.
    FrameReceived(Frame),
}

/// Work the runtime must perform for an outbound action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Emit a frame on the channel.
    Send(Frame),
}

/// A chat message encoded and ready to emit, not yet in local history.
///
/// Produced by [`Synchronizer::prepare_message`](crate::Synchronizer::prepare_message)
/// and handed back through
/// [`Synchronizer::commit_message`](crate::Synchronizer::commit_message) once
/// the frame is on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub(crate) message: ChatMessage,
    pub(crate) frame: Frame,
}

impl OutgoingMessage {
    /// Message as it will appear in history.
    pub fn message(&self) -> &ChatMessage {
        &self.message
    }

    /// Encoded `send-message` frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Split into the message and its frame.
    pub fn into_parts(self) -> (ChatMessage, Frame) {
        (self.message, self.frame)
    }
}

/// State changes the presentation layer may want to react to.
///
/// Purely informational; the authoritative data lives in
/// [`SessionState`](crate::SessionState).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Channel is open.
    Connected,
    /// Relay greeted us; login is now possible.
    Greeted {
        /// Greeting text
        text: String,
    },
    /// Login acknowledged.
    LoggedIn {
        /// Roster at the moment we joined
        roster: Roster,
    },
    /// Membership changed.
    RosterChanged {
        /// New roster
        roster: Roster,
    },
    /// Another participant's message arrived.
    MessageReceived(ChatMessage),
    /// Relay rejected a request.
    RelayError {
        /// Error code from the relay
        code: u16,
        /// Error text from the relay
        message: String,
    },
    /// Channel closed.
    Disconnected,
}
