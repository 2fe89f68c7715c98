//! Observable state snapshots for invariant checking.

use huddle_client::{ConnectionStatus, Session};
use huddle_proto::{ChatMessage, ConnectionId, Opcode, Roster};

use crate::{sim_env::SimEnv, sim_relay::{SimChannel, SimRelay}};

/// Relay roster plus every participant's view, taken at one instant.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Roster as the relay sees it.
    pub relay_roster: Roster,
    /// Per-participant snapshots.
    pub participants: Vec<ParticipantSnapshot>,
}

impl SystemSnapshot {
    /// Snapshot with no relay state and no participants.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the relay and every session connected to it.
    pub fn capture<'a>(
        relay: &SimRelay,
        sessions: impl IntoIterator<Item = &'a Session<SimChannel, SimEnv>>,
    ) -> Self {
        Self {
            relay_roster: relay.roster(),
            participants: sessions.into_iter().map(ParticipantSnapshot::from_session).collect(),
        }
    }
}

/// One participant's observable session state.
#[derive(Debug, Clone)]
pub struct ParticipantSnapshot {
    /// Relay-assigned connection ID, `None` if the channel never opened.
    pub connection_id: Option<ConnectionId>,
    /// Connection lifecycle.
    pub status: ConnectionStatus,
    /// Whether the relay acknowledged a login.
    pub logged_in: bool,
    /// Participant's roster.
    pub roster: Roster,
    /// Participant's message history.
    pub history: Vec<ChatMessage>,
    /// Highest handler count over all events.
    pub max_handler_count: usize,
}

impl ParticipantSnapshot {
    /// Snapshot a simulated session.
    pub fn from_session(session: &Session<SimChannel, SimEnv>) -> Self {
        let state = session.state();
        let subscriptions = session.synchronizer().subscriptions();

        Self {
            connection_id: session.channel().connection_id(),
            status: state.connection_status(),
            logged_in: state.is_logged_in(),
            roster: state.roster().clone(),
            history: state.history().as_slice().to_vec(),
            max_handler_count: Opcode::ALL
                .into_iter()
                .map(|opcode| subscriptions.handler_count(opcode))
                .max()
                .unwrap_or(0),
        }
    }
}
