//! Relay runtime errors.

use huddle_core::ChannelError;
use thiserror::Error;

use crate::driver::DriverError;

/// Errors from the production relay runtime.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Could not bind the listening socket.
    ///
    /// Fatal at startup; fix the address and restart.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested bind address
        addr: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Socket-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Frame I/O failed on a connection.
    ///
    /// Fatal for that connection only.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Driver reported an internal inconsistency.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}
