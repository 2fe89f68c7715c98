//! Event names.

use std::fmt;

/// Named event carried by a frame.
///
/// The opcode is the binary form of the event name; [`Opcode::event_name`]
/// gives the human-readable form used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum Opcode {
    /// Relay welcomes a freshly accepted connection.
    Greeting = 0x0001,
    /// Participant asks to join under a username.
    LoginRequest = 0x0002,
    /// Relay accepted the login; carries the full roster.
    LoginAck = 0x0003,
    /// Membership changed; carries the full roster.
    RosterChanged = 0x0004,
    /// Participant asks the relay to broadcast a message.
    SendMessage = 0x0005,
    /// Relay delivers a message authored by another participant.
    MessageDelivered = 0x0006,
    /// Relay rejected a request.
    Error = 0x00FF,
}

impl Opcode {
    /// Every opcode, in wire order.
    pub const ALL: [Self; 7] = [
        Self::Greeting,
        Self::LoginRequest,
        Self::LoginAck,
        Self::RosterChanged,
        Self::SendMessage,
        Self::MessageDelivered,
        Self::Error,
    ];

    /// Parse a raw opcode. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Greeting),
            0x0002 => Some(Self::LoginRequest),
            0x0003 => Some(Self::LoginAck),
            0x0004 => Some(Self::RosterChanged),
            0x0005 => Some(Self::SendMessage),
            0x0006 => Some(Self::MessageDelivered),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// Raw opcode value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Event name as it appears in the protocol description.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::LoginRequest => "login-request",
            Self::LoginAck => "login-ack",
            Self::RosterChanged => "roster-changed",
            Self::SendMessage => "send-message",
            Self::MessageDelivered => "message-delivered",
            Self::Error => "error",
        }
    }

    /// True for events a participant sends to the relay.
    #[must_use]
    pub const fn is_client_originated(self) -> bool {
        matches!(self, Self::LoginRequest | Self::SendMessage)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values_parse_back() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_opcode_is_none() {
        assert_eq!(Opcode::from_u16(0x0000), None);
        assert_eq!(Opcode::from_u16(0x1234), None);
    }

    #[test]
    fn only_requests_are_client_originated() {
        let client: Vec<_> = Opcode::ALL.into_iter().filter(|o| o.is_client_originated()).collect();
        assert_eq!(client, vec![Opcode::LoginRequest, Opcode::SendMessage]);
    }

    #[test]
    fn display_uses_event_name() {
        assert_eq!(Opcode::RosterChanged.to_string(), "roster-changed");
    }
}
