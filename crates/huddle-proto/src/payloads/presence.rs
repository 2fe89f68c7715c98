//! Presence payload types: who is online.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Relay-assigned identifier of one live connection.
///
/// Opaque to participants. Unique among live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One logged-in participant as seen by any observer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Connection the participant logged in on
    pub connection_id: ConnectionId,
    /// Display name chosen at login
    pub username: String,
}

impl Participant {
    /// Create a participant entry.
    pub fn new(connection_id: ConnectionId, username: impl Into<String>) -> Self {
        Self { connection_id, username: username.into() }
    }
}

/// Snapshot of every logged-in participant.
///
/// Unique by [`ConnectionId`] and held sorted by it, so two rosters with the
/// same members compare equal regardless of the order the relay listed them
/// in. On the wire a roster is a plain CBOR array of participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from participants. A later entry for the same
    /// connection replaces an earlier one.
    pub fn from_participants(participants: impl IntoIterator<Item = Participant>) -> Self {
        let by_id: BTreeMap<ConnectionId, Participant> =
            participants.into_iter().map(|p| (p.connection_id, p)).collect();
        Self { participants: by_id.into_values().collect() }
    }

    /// Check a roster received from the wire and put it in canonical order.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidPayload` on duplicate connection IDs or a
    ///   blank username
    pub fn validated(mut self) -> Result<Self> {
        if let Some(blank) = self.participants.iter().find(|p| p.username.trim().is_empty()) {
            return Err(ProtocolError::InvalidPayload(format!(
                "roster entry {} has a blank username",
                blank.connection_id
            )));
        }

        self.participants.sort_by_key(|p| p.connection_id);
        if let Some(pair) = self.participants.windows(2).find(|w| w[0].connection_id == w[1].connection_id)
        {
            return Err(ProtocolError::InvalidPayload(format!(
                "roster lists connection {} twice",
                pair[0].connection_id
            )));
        }

        Ok(self)
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True if nobody is logged in.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants in connection order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Iterate participants in connection order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Participant logged in on a connection. `None` if absent.
    pub fn get(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .binary_search_by_key(&connection_id, |p| p.connection_id)
            .ok()
            .and_then(|idx| self.participants.get(idx))
    }

    /// Check whether a connection is in the roster.
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.get(connection_id).is_some()
    }

    /// Display names in connection order.
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|p| p.username.as_str())
    }
}

impl FromIterator<Participant> for Roster {
    fn from_iter<T: IntoIterator<Item = Participant>>(iter: T) -> Self {
        Self::from_participants(iter)
    }
}
