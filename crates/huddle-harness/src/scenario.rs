//! Multi-participant scenarios over a simulated relay.

use std::time::Duration;

use huddle_client::{Session, SessionError, SessionUpdate};
use huddle_relay::RelayConfig;

use crate::{
    invariants::SystemSnapshot,
    sim_env::SimEnv,
    sim_relay::{SimChannel, SimRelay},
};

/// Session over a simulated channel.
pub type SimSession = Session<SimChannel, SimEnv>;

/// A relay and the participants connected to it, sharing one clock.
pub struct Scenario {
    env: SimEnv,
    relay: SimRelay,
    participants: Vec<SimSession>,
}

impl Scenario {
    /// Scenario with a default relay and an RNG seeded from `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, RelayConfig::default())
    }

    /// Scenario with a custom relay configuration.
    pub fn with_config(seed: u64, config: RelayConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let relay = SimRelay::new(env.clone(), config);
        Self { env, relay, participants: Vec::new() }
    }

    /// Connect a participant without logging in. Returns its index.
    pub async fn connect(&mut self) -> Result<usize, SessionError> {
        let mut session = Session::new(self.relay.channel(), self.env.clone());
        session.open().await?;
        session.process_ready();

        self.participants.push(session);
        Ok(self.participants.len() - 1)
    }

    /// Connect a participant and log it in as `username`. Returns its index.
    pub async fn join(&mut self, username: &str) -> Result<usize, SessionError> {
        let index = self.connect().await?;
        self.participants[index].submit_username(username)?;
        self.settle();
        Ok(index)
    }

    /// Send `text` from participant `index`, then advance the clock.
    pub fn send(&mut self, index: usize, text: &str) -> Result<(), SessionError> {
        self.participants[index].send_message(text)?;
        self.env.advance(Duration::from_millis(1));
        self.settle();
        Ok(())
    }

    /// Close participant `index`.
    pub fn leave(&mut self, index: usize) {
        self.participants[index].close();
        self.settle();
    }

    /// Deliver every queued frame to every participant.
    pub fn settle(&mut self) -> Vec<(usize, SessionUpdate)> {
        let mut updates = Vec::new();
        loop {
            let before = updates.len();
            for (index, session) in self.participants.iter_mut().enumerate() {
                updates.extend(session.process_ready().into_iter().map(|u| (index, u)));
            }
            if updates.len() == before {
                return updates;
            }
        }
    }

    /// Participant at `index`.
    pub fn participant(&self, index: usize) -> &SimSession {
        &self.participants[index]
    }

    /// Mutable participant at `index`.
    pub fn participant_mut(&mut self, index: usize) -> &mut SimSession {
        &mut self.participants[index]
    }

    /// Number of participants ever connected, closed ones included.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// The simulated relay.
    pub fn relay(&self) -> &SimRelay {
        &self.relay
    }

    /// Shared clock and RNG.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Snapshot of the relay and every participant.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::capture(&self.relay, &self.participants)
    }
}
