//! Session synchronizer.
//!
//! The `Synchronizer` is the participant-side state machine. It consumes
//! channel lifecycle events and inbound frames, keeps [`SessionState`] in step
//! with the relay, and turns the two user actions (log in, send a message)
//! into outbound frames.
//!
//! # Handler registration
//!
//! Inbound events are only processed if a handler is registered for them in
//! [`Subscriptions`]. Opening the channel registers the `greeting` handler.
//! The first greeting registers the rest (`login-ack`, `roster-changed`,
//! `message-delivered`, `error`). Later greetings log and change nothing, so
//! every handler is registered exactly once per connection and no message is
//! ever appended twice.
//!
//! # Self-echo
//!
//! A sent message is appended to history once its frame is emitted. The
//! relay does not loop it back, but if one did, the delivery is matched by
//! sender and nonce against recent sends and dropped. Matching never looks at
//! the text, so another participant saying the same thing at the same
//! millisecond under the same name is still shown.

use std::collections::{BTreeMap, VecDeque};

use huddle_core::env::Environment;
use huddle_proto::{
    ChatMessage, ErrorPayload, Frame, Greeting, LoginRequest, Opcode, Payload, Roster, SendMessage,
};

use crate::{
    error::SessionError,
    event::{OutgoingMessage, SessionAction, SessionEvent, SessionUpdate},
    state::{ConnectionStatus, SessionState},
};

/// Local echoes remembered for self-echo exclusion.
const MAX_RECENT_ECHOES: usize = 64;

/// Events registered once the relay has greeted us.
const GREETED_EVENTS: [Opcode; 4] =
    [Opcode::LoginAck, Opcode::RosterChanged, Opcode::MessageDelivered, Opcode::Error];

/// Registered inbound handlers, by event.
///
/// Each registration invokes its handler once per occurrence of the event, so
/// registering twice would process every occurrence twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    handlers: BTreeMap<Opcode, usize>,
}

impl Subscriptions {
    fn subscribe(&mut self, event: Opcode) {
        *self.handlers.entry(event).or_default() += 1;
    }

    fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of handlers registered for an event.
    pub fn handler_count(&self, event: Opcode) -> usize {
        self.handlers.get(&event).copied().unwrap_or(0)
    }

    /// True if at least one handler is registered for the event.
    pub fn is_subscribed(&self, event: Opcode) -> bool {
        self.handler_count(event) > 0
    }

    /// Events with at least one handler, in opcode order.
    pub fn events(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.handlers.keys().copied()
    }
}

/// Participant-side protocol state machine.
///
/// Pure: no I/O, no clocks except through `E`. Drive it with
/// [`Synchronizer::handle`] and emit the frames returned by the outbound
/// actions.
pub struct Synchronizer<E: Environment> {
    env: E,
    state: SessionState,
    subscriptions: Subscriptions,
    /// Set by the first greeting of this connection.
    greeted: bool,
    /// Nonces of our recent sends.
    recent_echoes: VecDeque<u64>,
}

impl<E: Environment> Synchronizer<E> {
    /// Create a synchronizer for a channel that is not open yet.
    pub fn new(env: E) -> Self {
        Self {
            env,
            state: SessionState::default(),
            subscriptions: Subscriptions::default(),
            greeted: false,
            recent_echoes: VecDeque::with_capacity(MAX_RECENT_ECHOES),
        }
    }

    /// Current session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Registered inbound handlers.
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Apply an inbound event.
    ///
    /// Never fails: frames that cannot be decoded, fail validation, or have no
    /// registered handler are logged and ignored with state unchanged.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionUpdate> {
        match event {
            SessionEvent::ChannelOpened => self.handle_opened(),
            SessionEvent::ChannelClosed => self.handle_closed(),
            SessionEvent::FrameReceived(frame) => self.handle_frame(&frame),
        }
    }

    /// Ask the relay to log us in as `name`.
    ///
    /// Records `name` as the chosen username. `logged_in` only flips when the
    /// relay acknowledges.
    ///
    /// # Errors
    ///
    /// - `SessionError::Closed` after the channel closed
    /// - `SessionError::NotConnected` before the channel opened
    /// - `SessionError::AwaitingGreeting` before the relay greeted us
    /// - `SessionError::AlreadyLoggedIn` after a successful login
    /// - `SessionError::EmptyUsername` if `name` is blank
    /// - `SessionError::UsernameTooLong` if `name` exceeds
    ///   [`LoginRequest::MAX_USERNAME_LEN`] bytes
    pub fn submit_username(&mut self, name: &str) -> Result<SessionAction, SessionError> {
        self.ensure_connected()?;
        if !self.greeted {
            return Err(SessionError::AwaitingGreeting);
        }
        if self.state.logged_in {
            return Err(SessionError::AlreadyLoggedIn);
        }
        if name.trim().is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if name.len() > LoginRequest::MAX_USERNAME_LEN {
            return Err(SessionError::UsernameTooLong { max: LoginRequest::MAX_USERNAME_LEN });
        }

        let frame = Payload::LoginRequest(LoginRequest::new(name)).into_frame()?;
        self.state.chosen_username = name.to_owned();

        tracing::debug!(username = name, "submitting login request");
        Ok(SessionAction::Send(frame))
    }

    /// Send a chat message to everyone else.
    ///
    /// The message is appended to our own history immediately. Use
    /// [`Synchronizer::prepare_message`] and [`Synchronizer::commit_message`]
    /// instead when the frame might not make it onto the channel.
    ///
    /// # Errors
    ///
    /// - any error from [`Synchronizer::prepare_message`]
    pub fn send_message(&mut self, text: &str) -> Result<SessionAction, SessionError> {
        let (message, frame) = self.prepare_message(text)?.into_parts();
        self.commit_message(message);
        Ok(SessionAction::Send(frame))
    }

    /// Stamp and encode a chat message without touching state.
    ///
    /// # Errors
    ///
    /// - `SessionError::Closed` after the channel closed
    /// - `SessionError::NotConnected` before the channel opened
    /// - `SessionError::NotLoggedIn` before the login was acknowledged
    /// - `SessionError::EmptyMessage` if `text` is empty
    /// - `SessionError::Protocol` if the message exceeds the frame size limit
    pub fn prepare_message(&self, text: &str) -> Result<OutgoingMessage, SessionError> {
        self.ensure_connected()?;
        if !self.state.logged_in {
            return Err(SessionError::NotLoggedIn);
        }
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let message =
            ChatMessage::new(self.state.chosen_username.as_str(), text, self.env.wall_clock_millis())
                .with_nonce(self.env.random_u64().max(1));
        let frame = Payload::SendMessage(SendMessage { message: message.clone() }).into_frame()?;

        Ok(OutgoingMessage { message, frame })
    }

    /// Record a message whose frame was emitted.
    ///
    /// Appends it to history and remembers its nonce so a looped-back copy
    /// is dropped.
    pub fn commit_message(&mut self, message: ChatMessage) {
        if self.recent_echoes.len() == MAX_RECENT_ECHOES {
            self.recent_echoes.pop_front();
        }
        self.recent_echoes.push_back(message.nonce);
        self.state.history.push(message);
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.state.connection_status {
            ConnectionStatus::Connected => Ok(()),
            ConnectionStatus::Connecting => Err(SessionError::NotConnected),
            ConnectionStatus::Closed => Err(SessionError::Closed),
        }
    }

    fn handle_opened(&mut self) -> Vec<SessionUpdate> {
        match self.state.connection_status {
            ConnectionStatus::Connecting => {
                self.state.connection_status = ConnectionStatus::Connected;
                self.subscriptions.subscribe(Opcode::Greeting);
                vec![SessionUpdate::Connected]
            },
            ConnectionStatus::Connected => Vec::new(),
            ConnectionStatus::Closed => {
                tracing::debug!("ignoring channel open after close");
                Vec::new()
            },
        }
    }

    fn handle_closed(&mut self) -> Vec<SessionUpdate> {
        if self.state.connection_status == ConnectionStatus::Closed {
            return Vec::new();
        }

        self.state.connection_status = ConnectionStatus::Closed;
        self.state.logged_in = false;
        self.state.roster = Roster::new();
        self.subscriptions.clear();
        self.recent_echoes.clear();

        tracing::info!("session closed");
        vec![SessionUpdate::Disconnected]
    }

    fn handle_frame(&mut self, frame: &Frame) -> Vec<SessionUpdate> {
        let Some(opcode) = frame.header.opcode_enum() else {
            tracing::warn!(opcode = frame.header.opcode(), "ignoring frame with unknown opcode");
            return Vec::new();
        };

        let handlers = self.subscriptions.handler_count(opcode);
        if handlers == 0 {
            tracing::debug!(event = %opcode, "ignoring event with no registered handler");
            return Vec::new();
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event = %opcode, error = %e, "rejecting malformed event");
                return Vec::new();
            },
        };

        let mut updates = Vec::new();
        for _ in 0..handlers {
            updates.extend(self.dispatch(payload.clone()));
        }
        updates
    }

    fn dispatch(&mut self, payload: Payload) -> Option<SessionUpdate> {
        match payload {
            Payload::Greeting(greeting) => self.on_greeting(greeting),
            Payload::LoginAck(roster) => {
                tracing::info!(participants = roster.len(), "login acknowledged");
                self.state.logged_in = true;
                self.state.roster = roster.clone();
                Some(SessionUpdate::LoggedIn { roster })
            },
            Payload::RosterChanged(roster) => {
                tracing::info!(participants = roster.len(), "roster changed");
                self.state.roster = roster.clone();
                Some(SessionUpdate::RosterChanged { roster })
            },
            Payload::MessageDelivered(message) => self.on_message(message),
            Payload::Error(error) => self.on_error(error),
            Payload::LoginRequest(_) | Payload::SendMessage(_) => None,
        }
    }

    fn on_greeting(&mut self, greeting: Greeting) -> Option<SessionUpdate> {
        tracing::info!(text = %greeting.text, "relay greeting");

        if self.greeted {
            tracing::debug!("repeated greeting, handlers already registered");
            return None;
        }

        for event in GREETED_EVENTS {
            self.subscriptions.subscribe(event);
        }
        self.greeted = true;
        self.state.greeting = Some(greeting.text.clone());

        Some(SessionUpdate::Greeted { text: greeting.text })
    }

    fn on_message(&mut self, message: ChatMessage) -> Option<SessionUpdate> {
        let own = message.is_tagged() && message.sender == self.state.chosen_username;
        let echo = own.then(|| self.recent_echoes.iter().position(|n| *n == message.nonce));
        if let Some(idx) = echo.flatten() {
            self.recent_echoes.remove(idx);
            tracing::debug!("dropping echo of our own message");
            return None;
        }

        self.state.history.push(message.clone());
        Some(SessionUpdate::MessageReceived(message))
    }

    fn on_error(&mut self, error: ErrorPayload) -> Option<SessionUpdate> {
        tracing::warn!(code = error.code, message = %error.message, "relay rejected request");
        self.state.last_error = Some(error.message.clone());
        Some(SessionUpdate::RelayError { code: error.code, message: error.message })
    }
}
