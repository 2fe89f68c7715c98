//! Relay driver.
//!
//! Sans-IO core of the relay. The runtime feeds it connection lifecycle events
//! and inbound frames; it updates the [`PresenceRegistry`] and answers with
//! actions (send, broadcast, close, log) for the runtime to execute.
//!
//! # Routing
//!
//! - accept: register the connection, send `greeting`
//! - `login-request`: log in, reply `login-ack` with the full roster, send
//!   `roster-changed` to every other logged-in participant
//! - `send-message`: `message-delivered` to every logged-in participant except
//!   the sender
//! - close: unregister; if the connection was logged in, send `roster-changed`
//!   to everyone left
//!
//! Anything else is answered with an `error` event to the offending
//! connection only.

use huddle_core::env::Environment;
use huddle_proto::{
    ConnectionId, ErrorPayload, Frame, Greeting, LoginRequest, Payload, ProtocolError, SendMessage,
};
use thiserror::Error;

use crate::presence::{PresenceRegistry, RegistryError};

/// Relay behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Text sent in the `greeting` event
    pub greeting: String,
    /// Maximum concurrent connections, anonymous ones included
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { greeting: "Welcome to Huddle".to_string(), max_connections: 10_000 }
    }
}

/// Events the relay driver processes.
///
/// Produced by the runtime (production or simulation).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted.
    ConnectionAccepted {
        /// ID assigned by the runtime
        connection_id: ConnectionId,
    },

    /// A frame arrived on a connection.
    FrameReceived {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// The received frame
        frame: Frame,
    },

    /// A connection closed (by peer, error, or relay).
    ConnectionClosed {
        /// Connection that closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions the relay driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send a frame to one connection.
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Frame to send
        frame: Frame,
    },

    /// Send a frame to every logged-in participant.
    ///
    /// Recipients are the registry's logged-in connections at the time the
    /// action is executed, minus `exclude`.
    Broadcast {
        /// Frame to send
        frame: Frame,
        /// Connection to skip (typically the originator)
        exclude: Option<ConnectionId>,
    },

    /// Close a connection.
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message.
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for relay actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Failures the driver cannot answer with an `error` event.
///
/// These indicate a runtime bug (events for connections the driver never
/// saw), not misbehaving participants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Registry rejected a runtime-initiated change.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Outbound frame could not be encoded.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] ProtocolError),
}

/// Action-based relay driver.
pub struct RelayDriver<E: Environment> {
    registry: PresenceRegistry,
    env: E,
    config: RelayConfig,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a new relay driver.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self { registry: PresenceRegistry::new(), env, config }
    }

    /// Process an event and return actions to execute, in order.
    ///
    /// # Errors
    ///
    /// - `DriverError::Registry` for duplicate accepts or frames from unknown
    ///   connections
    /// - `DriverError::Encode` if an outbound frame cannot be encoded
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, DriverError> {
        match event {
            RelayEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            RelayEvent::FrameReceived { connection_id, frame } => {
                self.handle_frame_received(connection_id, &frame)
            },
            RelayEvent::ConnectionClosed { connection_id, reason } => {
                self.handle_connection_closed(connection_id, &reason)
            },
        }
    }

    /// Draw a connection ID not currently in use.
    pub fn allocate_connection_id(&self) -> ConnectionId {
        loop {
            let id = ConnectionId(self.env.random_u64());
            if !self.registry.contains(id) {
                return id;
            }
        }
    }

    /// Presence registry.
    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Logged-in connections, in ID order.
    pub fn logged_in(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.registry.logged_in()
    }

    /// Relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if self.registry.connection_count() >= self.config.max_connections {
            let refusal = Payload::Error(ErrorPayload::relay_full(self.config.max_connections));
            return Ok(vec![
                RelayAction::SendToConnection { connection_id, frame: refusal.into_frame()? },
                RelayAction::CloseConnection {
                    connection_id,
                    reason: "max connections exceeded".to_string(),
                },
            ]);
        }

        self.registry.register(connection_id)?;
        let greeting = Payload::Greeting(Greeting::new(self.config.greeting.as_str()));

        Ok(vec![
            RelayAction::SendToConnection { connection_id, frame: greeting.into_frame()? },
            RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {connection_id} accepted"),
            },
        ])
    }

    fn handle_frame_received(
        &mut self,
        connection_id: ConnectionId,
        frame: &Frame,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if !self.registry.contains(connection_id) {
            return Err(RegistryError::UnknownConnection(connection_id).into());
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                return self.reject(
                    connection_id,
                    ErrorPayload::invalid_payload(e.to_string()),
                    format!("malformed frame from {connection_id}: {e}"),
                );
            },
        };

        match payload {
            Payload::LoginRequest(request) => self.handle_login(connection_id, &request),
            Payload::SendMessage(request) => self.handle_send_message(connection_id, request),
            other => {
                let opcode = other.opcode();
                self.reject(
                    connection_id,
                    ErrorPayload::unexpected_event(opcode),
                    format!("{connection_id} sent relay-only event {opcode}"),
                )
            },
        }
    }

    fn handle_login(
        &mut self,
        connection_id: ConnectionId,
        request: &LoginRequest,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let participant = match self.registry.login(connection_id, &request.username) {
            Ok(participant) => participant,
            Err(RegistryError::AlreadyLoggedIn(_)) => {
                return self.reject(
                    connection_id,
                    ErrorPayload::already_logged_in(),
                    format!("{connection_id} tried to log in twice"),
                );
            },
            Err(RegistryError::InvalidUsername) => {
                return self.reject(
                    connection_id,
                    ErrorPayload::invalid_username(),
                    format!("{connection_id} submitted a blank username"),
                );
            },
            Err(RegistryError::UsernameTooLong { len, max }) => {
                return self.reject(
                    connection_id,
                    ErrorPayload::username_too_long(max),
                    format!("{connection_id} submitted a {len}-byte username"),
                );
            },
            Err(e) => return Err(e.into()),
        };

        let roster = self.registry.roster();
        let frames = Payload::LoginAck(roster.clone()).into_frame().and_then(|ack| {
            Payload::RosterChanged(roster).into_frame().map(|changed| (ack, changed))
        });
        let (ack, changed) = match frames {
            Ok(frames) => frames,
            Err(ProtocolError::PayloadTooLarge { size, .. }) => {
                self.registry.logout(connection_id);
                return self.reject(
                    connection_id,
                    ErrorPayload::roster_full(),
                    format!("{connection_id} refused: roster would be {size} bytes"),
                );
            },
            Err(e) => {
                self.registry.logout(connection_id);
                return Err(e.into());
            },
        };

        Ok(vec![
            RelayAction::SendToConnection { connection_id, frame: ack },
            RelayAction::Broadcast { frame: changed, exclude: Some(connection_id) },
            RelayAction::Log {
                level: LogLevel::Info,
                message: format!("{} joined as {connection_id}", participant.username),
            },
        ])
    }

    fn handle_send_message(
        &mut self,
        connection_id: ConnectionId,
        request: SendMessage,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if !self.registry.is_logged_in(connection_id) {
            return self.reject(
                connection_id,
                ErrorPayload::not_logged_in(),
                format!("{connection_id} sent a message before logging in"),
            );
        }

        let delivered = Payload::MessageDelivered(request.message).into_frame()?;

        Ok(vec![
            RelayAction::Broadcast { frame: delivered, exclude: Some(connection_id) },
            RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("relaying message from {connection_id}"),
            },
        ])
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let Some(info) = self.registry.unregister(connection_id) else {
            // Refused at accept time; never registered.
            return Ok(Vec::new());
        };

        let Some(username) = info.username else {
            return Ok(vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("anonymous connection {connection_id} closed: {reason}"),
            }]);
        };

        let changed = Payload::RosterChanged(self.registry.roster()).into_frame()?;

        Ok(vec![
            RelayAction::Broadcast { frame: changed, exclude: None },
            RelayAction::Log {
                level: LogLevel::Info,
                message: format!("{username} left ({connection_id}): {reason}"),
            },
        ])
    }

    /// Answer a bad request with an `error` event to its sender only.
    fn reject(
        &self,
        connection_id: ConnectionId,
        error: ErrorPayload,
        log: String,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let frame = Payload::Error(error).into_frame()?;
        Ok(vec![
            RelayAction::SendToConnection { connection_id, frame },
            RelayAction::Log { level: LogLevel::Warn, message: log },
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use huddle_proto::{ChatMessage, FrameHeader, Opcode, Participant, Roster};

    use super::*;

    #[derive(Clone)]
    struct CountingEnv(std::sync::Arc<std::sync::atomic::AtomicU64>);

    impl Environment for CountingEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn wall_clock_millis(&self) -> u64 {
            0
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            for (dst, src) in buffer.iter_mut().zip(n.to_be_bytes().iter().cycle()) {
                *dst = *src;
            }
        }
    }

    fn driver() -> RelayDriver<CountingEnv> {
        RelayDriver::new(CountingEnv(Default::default()), RelayConfig::default())
    }

    fn payload_of(frame: &Frame) -> Payload {
        Payload::from_frame(frame).expect("valid payload")
    }

    fn sends(actions: &[RelayAction]) -> Vec<(ConnectionId, Payload)> {
        actions
            .iter()
            .filter_map(|a| match a {
                RelayAction::SendToConnection { connection_id, frame } => {
                    Some((*connection_id, payload_of(frame)))
                },
                _ => None,
            })
            .collect()
    }

    fn broadcasts(actions: &[RelayAction]) -> Vec<(Option<ConnectionId>, Payload)> {
        actions
            .iter()
            .filter_map(|a| match a {
                RelayAction::Broadcast { frame, exclude } => Some((*exclude, payload_of(frame))),
                _ => None,
            })
            .collect()
    }

    fn accept(driver: &mut RelayDriver<CountingEnv>, id: u64) -> Vec<RelayAction> {
        driver
            .process_event(RelayEvent::ConnectionAccepted { connection_id: ConnectionId(id) })
            .expect("accept")
    }

    fn receive(driver: &mut RelayDriver<CountingEnv>, id: u64, payload: Payload) -> Vec<RelayAction> {
        driver
            .process_event(RelayEvent::FrameReceived {
                connection_id: ConnectionId(id),
                frame: payload.into_frame().expect("frame"),
            })
            .expect("frame")
    }

    fn login(driver: &mut RelayDriver<CountingEnv>, id: u64, name: &str) -> Vec<RelayAction> {
        receive(driver, id, Payload::LoginRequest(LoginRequest::new(name)))
    }

    #[test]
    fn accept_sends_greeting() {
        let mut driver = driver();
        let actions = accept(&mut driver, 1);

        assert_eq!(
            sends(&actions),
            vec![(ConnectionId(1), Payload::Greeting(Greeting::new("Welcome to Huddle")))]
        );
        assert!(driver.registry().contains(ConnectionId(1)));
    }

    #[test]
    fn duplicate_accept_is_driver_error() {
        let mut driver = driver();
        accept(&mut driver, 1);
        let result =
            driver.process_event(RelayEvent::ConnectionAccepted { connection_id: ConnectionId(1) });
        assert!(matches!(result, Err(DriverError::Registry(RegistryError::AlreadyRegistered(_)))));
    }

    #[test]
    fn login_acks_joiner_and_notifies_others() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        login(&mut driver, 1, "alice");

        let actions = login(&mut driver, 2, "bob");
        let roster = Roster::from_participants([
            Participant::new(ConnectionId(1), "alice"),
            Participant::new(ConnectionId(2), "bob"),
        ]);

        assert_eq!(sends(&actions), vec![(ConnectionId(2), Payload::LoginAck(roster.clone()))]);
        assert_eq!(
            broadcasts(&actions),
            vec![(Some(ConnectionId(2)), Payload::RosterChanged(roster))]
        );
    }

    #[test]
    fn message_excludes_sender() {
        let mut driver = driver();
        accept(&mut driver, 1);
        login(&mut driver, 1, "alice");

        let message = ChatMessage::new("alice", "hi", 42);
        let actions =
            receive(&mut driver, 1, Payload::SendMessage(SendMessage { message: message.clone() }));

        assert!(sends(&actions).is_empty());
        assert_eq!(
            broadcasts(&actions),
            vec![(Some(ConnectionId(1)), Payload::MessageDelivered(message))]
        );
    }

    #[test]
    fn message_before_login_rejected() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let message = ChatMessage::new("alice", "hi", 42);
        let actions = receive(&mut driver, 1, Payload::SendMessage(SendMessage { message }));

        assert_eq!(
            sends(&actions),
            vec![(ConnectionId(1), Payload::Error(ErrorPayload::not_logged_in()))]
        );
        assert!(broadcasts(&actions).is_empty());
    }

    #[test]
    fn second_login_rejected() {
        let mut driver = driver();
        accept(&mut driver, 1);
        login(&mut driver, 1, "alice");

        let actions = login(&mut driver, 1, "alice");
        assert_eq!(
            sends(&actions),
            vec![(ConnectionId(1), Payload::Error(ErrorPayload::already_logged_in()))]
        );
        assert_eq!(driver.registry().participant_count(), 1);
    }

    #[test]
    fn blank_username_rejected() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = login(&mut driver, 1, "  ");
        assert_eq!(
            sends(&actions),
            vec![(ConnectionId(1), Payload::Error(ErrorPayload::invalid_username()))]
        );
        assert!(!driver.registry().is_logged_in(ConnectionId(1)));
    }

    #[test]
    fn overlong_username_rejected() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        login(&mut driver, 2, "bob");

        let actions = login(&mut driver, 1, &"m".repeat(LoginRequest::MAX_USERNAME_LEN + 1));
        assert_eq!(
            sends(&actions),
            vec![(
                ConnectionId(1),
                Payload::Error(ErrorPayload::username_too_long(LoginRequest::MAX_USERNAME_LEN))
            )]
        );
        assert!(broadcasts(&actions).is_empty());
        assert!(!driver.registry().is_logged_in(ConnectionId(1)));
        assert_eq!(driver.registry().roster().usernames().collect::<Vec<_>>(), ["bob"]);
    }

    #[test]
    fn login_refused_when_roster_outgrows_a_frame() {
        let config = RelayConfig { max_connections: 20_000, ..RelayConfig::default() };
        let mut driver = RelayDriver::new(CountingEnv(Default::default()), config);
        let name = "n".repeat(LoginRequest::MAX_USERNAME_LEN);
        for id in 100..13_100 {
            driver.registry.register(ConnectionId(id)).expect("register");
            driver.registry.login(ConnectionId(id), &name).expect("login");
        }
        let before = driver.registry().participant_count();
        accept(&mut driver, 1);

        let actions = login(&mut driver, 1, "late");
        assert_eq!(
            sends(&actions),
            vec![(ConnectionId(1), Payload::Error(ErrorPayload::roster_full()))]
        );
        assert!(broadcasts(&actions).is_empty());
        assert!(driver.registry().contains(ConnectionId(1)));
        assert!(!driver.registry().is_logged_in(ConnectionId(1)));
        assert_eq!(driver.registry().participant_count(), before);
    }

    #[test]
    fn relay_only_event_rejected() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = receive(&mut driver, 1, Payload::RosterChanged(Roster::new()));
        assert_eq!(
            sends(&actions),
            vec![(
                ConnectionId(1),
                Payload::Error(ErrorPayload::unexpected_event(Opcode::RosterChanged))
            )]
        );
    }

    #[test]
    fn malformed_frame_rejected() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let frame = Frame::new(FrameHeader::new(Opcode::LoginRequest), vec![0xFF, 0xFF]);
        let actions = driver
            .process_event(RelayEvent::FrameReceived { connection_id: ConnectionId(1), frame })
            .expect("handled");

        let replies = sends(&actions);
        assert_eq!(replies.len(), 1);
        assert!(matches!(
            &replies[0].1,
            Payload::Error(e) if e.code == ErrorPayload::INVALID_PAYLOAD
        ));
    }

    #[test]
    fn frame_from_unknown_connection_is_driver_error() {
        let mut driver = driver();
        let frame = Payload::LoginRequest(LoginRequest::new("x")).into_frame().expect("frame");
        let result = driver
            .process_event(RelayEvent::FrameReceived { connection_id: ConnectionId(9), frame });
        assert!(matches!(result, Err(DriverError::Registry(RegistryError::UnknownConnection(_)))));
    }

    #[test]
    fn close_of_participant_notifies_remaining() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        login(&mut driver, 1, "alice");
        login(&mut driver, 2, "bob");

        let actions = driver
            .process_event(RelayEvent::ConnectionClosed {
                connection_id: ConnectionId(2),
                reason: "peer closed".to_string(),
            })
            .expect("close");

        let remaining = Roster::from_participants([Participant::new(ConnectionId(1), "alice")]);
        assert_eq!(broadcasts(&actions), vec![(None, Payload::RosterChanged(remaining))]);
        assert_eq!(driver.logged_in().collect::<Vec<_>>(), vec![ConnectionId(1)]);
    }

    #[test]
    fn close_of_anonymous_connection_is_silent() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = driver
            .process_event(RelayEvent::ConnectionClosed {
                connection_id: ConnectionId(1),
                reason: "peer closed".to_string(),
            })
            .expect("close");

        assert!(broadcasts(&actions).is_empty());
        assert!(!driver.registry().contains(ConnectionId(1)));
    }

    #[test]
    fn max_connections_enforced() {
        let mut driver = RelayDriver::new(
            CountingEnv(Default::default()),
            RelayConfig { max_connections: 1, ..RelayConfig::default() },
        );
        accept(&mut driver, 1);

        let actions = accept(&mut driver, 2);
        assert!(actions.iter().any(|a| matches!(
            a,
            RelayAction::CloseConnection { connection_id, .. } if *connection_id == ConnectionId(2)
        )));
        assert!(!driver.registry().contains(ConnectionId(2)));
    }

    #[test]
    fn allocated_ids_are_unused() {
        let driver = driver();
        let a = driver.allocate_connection_id();
        let b = driver.allocate_connection_id();
        assert_ne!(a, b);
    }
}
