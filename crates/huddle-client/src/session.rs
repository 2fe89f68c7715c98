//! Session runtime.
//!
//! Owns one [`EventChannel`] and one [`Synchronizer`] and moves frames between
//! them. All protocol decisions stay in the synchronizer; this type only does
//! the I/O the synchronizer asks for.

use huddle_core::{ChannelError, Environment, EventChannel};

use crate::{
    error::SessionError,
    event::{SessionAction, SessionEvent, SessionUpdate},
    state::{ConnectionStatus, SessionState},
    synchronizer::Synchronizer,
};

/// A participant's live session with the relay.
///
/// # Type Parameters
///
/// - `C`: transport (TCP in production, in-process in simulation)
/// - `E`: environment for message timestamps
pub struct Session<C, E>
where
    C: EventChannel,
    E: Environment,
{
    channel: C,
    sync: Synchronizer<E>,
}

impl<C, E> Session<C, E>
where
    C: EventChannel,
    E: Environment,
{
    /// Create a session over a channel that has not been opened.
    pub fn new(channel: C, env: E) -> Self {
        Self { channel, sync: Synchronizer::new(env) }
    }

    /// Open the channel.
    ///
    /// # Errors
    ///
    /// - `SessionError::Closed` if the session was already closed
    /// - `SessionError::Channel` if the channel cannot connect
    pub async fn open(&mut self) -> Result<Vec<SessionUpdate>, SessionError> {
        if self.sync.state().connection_status() == ConnectionStatus::Closed {
            return Err(SessionError::Closed);
        }

        self.channel.open().await?;
        Ok(self.sync.handle(SessionEvent::ChannelOpened))
    }

    /// Ask the relay to log us in.
    ///
    /// # Errors
    ///
    /// - any precondition error from [`Synchronizer::submit_username`]
    /// - `SessionError::Channel` if the channel refused the frame
    pub fn submit_username(&mut self, name: &str) -> Result<(), SessionError> {
        let action = self.sync.submit_username(name)?;
        self.execute(action)
    }

    /// Send a chat message to every other participant.
    ///
    /// The message joins local history only once the channel accepted its
    /// frame.
    ///
    /// # Errors
    ///
    /// - any precondition error from [`Synchronizer::prepare_message`]
    /// - `SessionError::Channel` if the channel refused the frame
    pub fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        let (message, frame) = self.sync.prepare_message(text)?.into_parts();
        self.execute(SessionAction::Send(frame))?;
        self.sync.commit_message(message);
        Ok(())
    }

    /// Wait for the next inbound frame and apply it.
    ///
    /// Returns `None` once the session is closed and nothing is left to
    /// deliver.
    pub async fn next_event(&mut self) -> Option<Vec<SessionUpdate>> {
        if self.sync.state().connection_status() == ConnectionStatus::Closed {
            return None;
        }

        match self.channel.recv().await {
            Some(frame) => Some(self.sync.handle(SessionEvent::FrameReceived(frame))),
            None => Some(self.sync.handle(SessionEvent::ChannelClosed)),
        }
    }

    /// Apply every frame that is already buffered, without waiting.
    pub fn process_ready(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();

        while let Some(frame) = self.channel.try_recv() {
            updates.extend(self.sync.handle(SessionEvent::FrameReceived(frame)));
        }

        if !self.channel.is_open()
            && self.sync.state().connection_status() == ConnectionStatus::Connected
        {
            updates.extend(self.sync.handle(SessionEvent::ChannelClosed));
        }

        updates
    }

    /// Close the channel. The session cannot be reopened.
    pub fn close(&mut self) -> Vec<SessionUpdate> {
        self.channel.close();
        self.sync.handle(SessionEvent::ChannelClosed)
    }

    /// Current session state.
    pub fn state(&self) -> &SessionState {
        self.sync.state()
    }

    /// Underlying synchronizer, for inspection.
    pub fn synchronizer(&self) -> &Synchronizer<E> {
        &self.sync
    }

    /// Underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn execute(&mut self, action: SessionAction) -> Result<(), SessionError> {
        match action {
            SessionAction::Send(frame) => match self.channel.emit(frame) {
                Ok(()) => Ok(()),
                Err(ChannelError::Closed) => {
                    tracing::warn!("channel closed while sending");
                    self.sync.handle(SessionEvent::ChannelClosed);
                    Err(SessionError::Channel(ChannelError::Closed))
                },
                Err(e) => Err(e.into()),
            },
        }
    }
}
