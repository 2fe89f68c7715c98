//! In-process relay and event channel.
//!
//! [`SimRelay`] runs the production [`RelayDriver`] against per-connection
//! mailboxes instead of sockets. [`SimChannel`] is the participant end of one
//! mailbox and implements [`EventChannel`], so a real
//! [`Session`](huddle_client::Session) runs unmodified on top of it.
//!
//! Everything happens synchronously inside `emit`/`open`/`close`: when the call
//! returns, the relay has processed the frame and every resulting frame sits in
//! its recipient's mailbox. Mailboxes are FIFO, so per-recipient order is the
//! order the driver produced frames in.

use std::{
    collections::{BTreeMap, VecDeque},
    future::poll_fn,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use huddle_core::{ChannelError, EventChannel};
use huddle_proto::{ConnectionId, Frame, Roster};
use huddle_relay::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};

use crate::sim_env::SimEnv;

/// Frames queued for one participant.
#[derive(Default)]
struct Mailbox {
    frames: VecDeque<Frame>,
    /// False once the relay closed the connection. Queued frames are still
    /// delivered.
    open: bool,
    waker: Option<Waker>,
}

impl Mailbox {
    fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }

    fn shut(&mut self) {
        self.open = false;
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

struct RelayState {
    driver: RelayDriver<SimEnv>,
    mailboxes: BTreeMap<ConnectionId, Mailbox>,
    frames_delivered: u64,
}

/// Simulated relay shared by every [`SimChannel`] it hands out.
#[derive(Clone)]
pub struct SimRelay {
    state: Arc<Mutex<RelayState>>,
}

impl SimRelay {
    /// Relay using `env` for connection IDs.
    pub fn new(env: SimEnv, config: RelayConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                driver: RelayDriver::new(env, config),
                mailboxes: BTreeMap::new(),
                frames_delivered: 0,
            })),
        }
    }

    /// New, unopened channel to this relay.
    pub fn channel(&self) -> SimChannel {
        SimChannel { relay: self.clone(), connection_id: None, closed: false }
    }

    /// Relay's current roster.
    pub fn roster(&self) -> Roster {
        self.lock().driver.registry().roster()
    }

    /// Live connections, anonymous ones included.
    pub fn connection_count(&self) -> usize {
        self.lock().driver.registry().connection_count()
    }

    /// Total frames placed in mailboxes so far.
    pub fn frames_delivered(&self) -> u64 {
        self.lock().frames_delivered
    }

    /// Drop a connection from the relay side, as if its socket died.
    ///
    /// Frames already queued stay readable; further emits fail with
    /// [`ChannelError::Closed`].
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let mut state = self.lock();
        let Some(mailbox) = state.mailboxes.get_mut(&connection_id) else {
            return;
        };
        if !mailbox.open {
            return;
        }
        mailbox.shut();

        process(
            &mut state,
            RelayEvent::ConnectionClosed { connection_id, reason: "connection lost".to_string() },
        );
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept(&self) -> Result<ConnectionId, ChannelError> {
        let mut state = self.lock();
        let connection_id = state.driver.allocate_connection_id();
        state.mailboxes.insert(connection_id, Mailbox { open: true, ..Mailbox::default() });

        process(&mut state, RelayEvent::ConnectionAccepted { connection_id });
        Ok(connection_id)
    }

    fn deliver(&self, connection_id: ConnectionId, frame: Frame) -> Result<(), ChannelError> {
        let mut state = self.lock();
        if !state.mailboxes.get(&connection_id).is_some_and(|m| m.open) {
            return Err(ChannelError::Closed);
        }

        process(&mut state, RelayEvent::FrameReceived { connection_id, frame });
        Ok(())
    }

    fn hang_up(&self, connection_id: ConnectionId) {
        let mut state = self.lock();
        if state.mailboxes.remove(&connection_id).is_none() {
            return;
        }

        process(
            &mut state,
            RelayEvent::ConnectionClosed { connection_id, reason: "peer closed".to_string() },
        );
    }

    fn poll_frame(&self, connection_id: ConnectionId, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        let mut state = self.lock();
        let Some(mailbox) = state.mailboxes.get_mut(&connection_id) else {
            return Poll::Ready(None);
        };

        if let Some(frame) = mailbox.frames.pop_front() {
            return Poll::Ready(Some(frame));
        }
        if !mailbox.open {
            return Poll::Ready(None);
        }

        mailbox.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn take_frame(&self, connection_id: ConnectionId) -> Option<Frame> {
        self.lock().mailboxes.get_mut(&connection_id)?.frames.pop_front()
    }

    fn is_open(&self, connection_id: ConnectionId) -> bool {
        self.lock().mailboxes.get(&connection_id).is_some_and(|m| m.open)
    }
}

/// Run one event through the driver and execute the resulting actions,
/// including the close events that relay-initiated closes produce.
fn process(state: &mut RelayState, event: RelayEvent) {
    let mut pending = VecDeque::from([event]);

    while let Some(event) = pending.pop_front() {
        let actions = match state.driver.process_event(event) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(error = %e, "simulated relay rejected event");
                continue;
            },
        };

        for action in actions {
            match action {
                RelayAction::SendToConnection { connection_id, frame } => {
                    if let Some(mailbox) = state.mailboxes.get_mut(&connection_id) {
                        mailbox.push(frame);
                        state.frames_delivered += 1;
                    }
                },
                RelayAction::Broadcast { frame, exclude } => {
                    for connection_id in state.driver.logged_in() {
                        if Some(connection_id) == exclude {
                            continue;
                        }
                        if let Some(mailbox) = state.mailboxes.get_mut(&connection_id) {
                            mailbox.push(frame.clone());
                            state.frames_delivered += 1;
                        }
                    }
                },
                RelayAction::CloseConnection { connection_id, reason } => {
                    if let Some(mailbox) = state.mailboxes.get_mut(&connection_id) {
                        mailbox.shut();
                    }
                    pending.push_back(RelayEvent::ConnectionClosed { connection_id, reason });
                },
                RelayAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }
}

/// Participant end of a simulated connection.
pub struct SimChannel {
    relay: SimRelay,
    connection_id: Option<ConnectionId>,
    closed: bool,
}

impl SimChannel {
    /// Connection ID the relay assigned. `None` before `open`.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }
}

impl EventChannel for SimChannel {
    async fn open(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if self.connection_id.is_none() {
            self.connection_id = Some(self.relay.accept()?);
        }
        Ok(())
    }

    fn emit(&mut self, frame: Frame) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let connection_id = self.connection_id.ok_or(ChannelError::NotOpen)?;
        self.relay.deliver(connection_id, frame)
    }

    async fn recv(&mut self) -> Option<Frame> {
        let connection_id = self.connection_id?;
        if self.closed {
            return None;
        }
        let relay = self.relay.clone();
        poll_fn(move |cx| relay.poll_frame(connection_id, cx)).await
    }

    fn try_recv(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        self.relay.take_frame(self.connection_id?)
    }

    fn is_open(&self) -> bool {
        !self.closed && self.connection_id.is_some_and(|id| self.relay.is_open(id))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(connection_id) = self.connection_id {
            self.relay.hang_up(connection_id);
        }
    }
}
