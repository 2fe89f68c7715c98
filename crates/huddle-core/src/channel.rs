//! Bidirectional event channel.
//!
//! A participant talks to the relay over exactly one channel. The channel is an
//! owned value with an explicit lifecycle: constructed closed, `open`ed once,
//! `close`d once. Nothing about it is global.
//!
//! # Ordering
//!
//! Frames emitted `E1, E2` by one endpoint are observed `E1, E2` by the other.
//! Implementations must preserve this (a single writer per direction is
//! enough).
//!
//! # Delivery
//!
//! `emit` is fire-and-forget: it queues the frame and returns. There is no
//! acknowledgment and no retry. Emitting before `open` or after `close` is an
//! error rather than a silent drop.

use std::future::Future;

use huddle_proto::Frame;

use crate::error::ChannelError;

/// Ordered, bidirectional frame transport owned by one session.
///
/// # Implementations
///
/// - `TcpChannel` in `huddle-client`: tokio TCP with reader/writer tasks
/// - `SimChannel` in `huddle-harness`: in-process queues wired to a
///   simulated relay
pub trait EventChannel: Send {
    /// Establish the connection.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Connect` if the peer cannot be reached
    /// - `ChannelError::Closed` if the channel was already closed
    fn open(&mut self) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Queue a frame for the peer. Does not wait for delivery.
    ///
    /// # Errors
    ///
    /// - `ChannelError::NotOpen` before [`EventChannel::open`]
    /// - `ChannelError::Closed` after [`EventChannel::close`] or peer hangup
    fn emit(&mut self, frame: Frame) -> Result<(), ChannelError>;

    /// Wait for the next inbound frame. `None` once the channel is closed and
    /// drained.
    fn recv(&mut self) -> impl Future<Output = Option<Frame>> + Send;

    /// Next inbound frame if one is already buffered.
    fn try_recv(&mut self) -> Option<Frame>;

    /// True between a successful `open` and `close` (or peer hangup).
    fn is_open(&self) -> bool;

    /// Tear the connection down. Idempotent.
    fn close(&mut self);
}
