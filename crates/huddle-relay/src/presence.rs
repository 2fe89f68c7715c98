//! Presence registry.
//!
//! Tracks every live connection and, for those that completed the login
//! handshake, the participant's username. The roster is derived from it on
//! demand; nothing else is stored, so the roster cannot drift from the set of
//! connections.
//!
//! Connections are kept in a `BTreeMap` so iteration (and therefore broadcast
//! order) is deterministic.

use std::collections::BTreeMap;

use huddle_proto::{ConnectionId, LoginRequest, Participant, Roster};
use thiserror::Error;

/// Registry failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Connection ID already in use.
    #[error("connection {0} already registered")]
    AlreadyRegistered(ConnectionId),

    /// Connection ID not known.
    #[error("connection {0} not registered")]
    UnknownConnection(ConnectionId),

    /// Connection already completed a login.
    #[error("connection {0} already logged in")]
    AlreadyLoggedIn(ConnectionId),

    /// Username is empty or whitespace.
    #[error("username must not be blank")]
    InvalidUsername,

    /// Username longer than [`LoginRequest::MAX_USERNAME_LEN`].
    #[error("username is {len} bytes, limit is {max}")]
    UsernameTooLong {
        /// Submitted length in bytes
        len: usize,
        /// Maximum allowed length
        max: usize,
    },
}

/// What the relay knows about one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Username, once logged in
    pub username: Option<String>,
}

impl ConnectionInfo {
    /// True once the connection completed the login handshake.
    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }
}

/// Live connections and who is logged in on them.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: BTreeMap<ConnectionId, ConnectionInfo>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted, anonymous connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyRegistered` if the ID is in use
    pub fn register(&mut self, connection_id: ConnectionId) -> Result<(), RegistryError> {
        if self.connections.contains_key(&connection_id) {
            return Err(RegistryError::AlreadyRegistered(connection_id));
        }
        self.connections.insert(connection_id, ConnectionInfo::default());
        Ok(())
    }

    /// Log a connection in under `username`.
    ///
    /// Usernames need not be unique; participants are told apart by
    /// connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::UnknownConnection` if not registered
    /// - `RegistryError::AlreadyLoggedIn` if this connection already logged in
    /// - `RegistryError::InvalidUsername` if `username` is blank
    /// - `RegistryError::UsernameTooLong` if `username` exceeds
    ///   [`LoginRequest::MAX_USERNAME_LEN`] bytes
    pub fn login(
        &mut self,
        connection_id: ConnectionId,
        username: &str,
    ) -> Result<Participant, RegistryError> {
        let info = self
            .connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;

        if info.is_logged_in() {
            return Err(RegistryError::AlreadyLoggedIn(connection_id));
        }
        if username.trim().is_empty() {
            return Err(RegistryError::InvalidUsername);
        }
        if username.len() > LoginRequest::MAX_USERNAME_LEN {
            return Err(RegistryError::UsernameTooLong {
                len: username.len(),
                max: LoginRequest::MAX_USERNAME_LEN,
            });
        }

        info.username = Some(username.to_owned());
        Ok(Participant::new(connection_id, username))
    }

    /// Undo a login, leaving the connection registered and anonymous.
    /// Returns the username it had.
    pub fn logout(&mut self, connection_id: ConnectionId) -> Option<String> {
        self.connections.get_mut(&connection_id)?.username.take()
    }

    /// Remove a connection. Returns what was known about it.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.remove(&connection_id)
    }

    /// Connection metadata. `None` if not registered.
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&ConnectionInfo> {
        self.connections.get(&connection_id)
    }

    /// Check if a connection is registered.
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Check if a connection completed the login handshake.
    pub fn is_logged_in(&self, connection_id: ConnectionId) -> bool {
        self.connections.get(&connection_id).is_some_and(ConnectionInfo::is_logged_in)
    }

    /// Snapshot of every logged-in participant.
    pub fn roster(&self) -> Roster {
        self.connections
            .iter()
            .filter_map(|(id, info)| {
                info.username.as_deref().map(|name| Participant::new(*id, name))
            })
            .collect()
    }

    /// Logged-in connections, in ID order.
    pub fn logged_in(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().filter(|(_, info)| info.is_logged_in()).map(|(id, _)| *id)
    }

    /// Total number of live connections, anonymous or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of logged-in participants.
    pub fn participant_count(&self) -> usize {
        self.logged_in().count()
    }
}
