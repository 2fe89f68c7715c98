//! Session handshake payloads.

use serde::{Deserialize, Serialize};

/// Sent by the relay right after accepting a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    /// Free-form welcome text
    pub text: String,
}

impl Greeting {
    /// Create a greeting.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Participant's request to join under a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Requested display name
    pub username: String,
}

impl LoginRequest {
    /// Longest accepted username, in UTF-8 bytes.
    ///
    /// Keeps a full roster of a busy relay inside one frame.
    pub const MAX_USERNAME_LEN: usize = 64;

    /// Create a login request.
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }
}
