//! Participant-side view of the session.
//!
//! [`SessionState`] is owned by the [`Synchronizer`](crate::Synchronizer).
//! Presentation code gets `&SessionState` and reads it; every mutation goes
//! through an inbound event or one of the two outbound actions.

use huddle_proto::{ChatMessage, Roster};

/// Lifecycle of the underlying event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Channel constructed, not yet open.
    #[default]
    Connecting,
    /// Channel open.
    Connected,
    /// Channel closed. Terminal.
    Closed,
}

/// Append-only, insertion-ordered list of chat messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHistory {
    messages: Vec<ChatMessage>,
}

impl MessageHistory {
    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Messages in arrival order.
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Iterate messages in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if no message was sent or received yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Everything a participant knows about its session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub(crate) connection_status: ConnectionStatus,
    pub(crate) logged_in: bool,
    pub(crate) chosen_username: String,
    pub(crate) greeting: Option<String>,
    pub(crate) roster: Roster,
    pub(crate) history: MessageHistory,
    pub(crate) last_error: Option<String>,
}

impl SessionState {
    /// Channel lifecycle.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    /// True once the relay acknowledged the login.
    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Name submitted with the last login request. Empty before that.
    pub fn chosen_username(&self) -> &str {
        &self.chosen_username
    }

    /// Text of the relay's greeting, once received.
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// Latest roster snapshot from the relay.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Chat history.
    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Message of the last `error` event from the relay.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
