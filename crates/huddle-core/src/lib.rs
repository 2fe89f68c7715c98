//! Shared building blocks for Huddle participants and the relay.
//!
//! Protocol logic in Huddle is Sans-IO: state machines take events and return
//! actions, and never touch sockets or clocks directly. This crate holds the
//! seams that keep it that way.
//!
//! - [`env::Environment`]: time and randomness, swapped for a seeded
//!   simulation in tests
//! - [`channel::EventChannel`]: the bidirectional, ordered event transport a
//!   participant session owns
//! - [`wire`]: reading and writing frames on async byte streams

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod env;
pub mod error;
mod system_env;
pub mod wire;

pub use channel::EventChannel;
pub use env::Environment;
pub use error::ChannelError;
pub use system_env::SystemEnv;
