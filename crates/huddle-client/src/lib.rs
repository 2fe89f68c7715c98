//! Participant side of the Huddle protocol.
//!
//! [`Synchronizer`] is a Sans-IO state machine that keeps a participant's
//! [`SessionState`] (connection status, login, roster, history) in step with
//! the relay. [`Session`] drives it over any [`huddle_core::EventChannel`].
//! With the `transport` feature, [`TcpChannel`] provides the production
//! channel.
//!
//! # Flow
//!
//! ```text
//! open ─► greeting ─► submit_username ─► login-ack ─► roster-changed* / message-delivered*
//!                                              │
//!                                              └─► send_message (emits, then appends locally)
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod session;
mod state;
mod synchronizer;
#[cfg(feature = "transport")]
pub mod transport;

pub use error::SessionError;
pub use event::{OutgoingMessage, SessionAction, SessionEvent, SessionUpdate};
pub use session::Session;
pub use state::{ConnectionStatus, MessageHistory, SessionState};
pub use synchronizer::{Subscriptions, Synchronizer};
#[cfg(feature = "transport")]
pub use transport::TcpChannel;
