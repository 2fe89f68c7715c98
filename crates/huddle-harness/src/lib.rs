//! Deterministic simulation harness for Huddle.
//!
//! Runs real [`Session`](huddle_client::Session)s against the real
//! [`RelayDriver`](huddle_relay::RelayDriver) without sockets or wall-clock
//! time. [`SimEnv`] supplies a seeded RNG and a manual clock, [`SimRelay`]
//! routes frames through in-memory mailboxes, and [`Scenario`] ties them
//! together for multi-participant tests.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after any
//! sequence of joins, leaves and messages. Use
//! [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_env;
pub mod sim_relay;

pub use invariants::{
    Invariant, InvariantRegistry, InvariantResult, LoginConsistency, NoDuplicateMessages,
    ParticipantSnapshot, RosterConvergence, SingleSubscription, SystemSnapshot, Violation,
};
pub use scenario::{Scenario, SimSession};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_relay::{SimChannel, SimRelay};
