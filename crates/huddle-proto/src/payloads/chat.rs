//! Chat message payloads.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// One chat line.
///
/// `created_at` is the author's wall clock in milliseconds since the Unix
/// epoch. The relay forwards it untouched, as it does `nonce`.
///
/// `nonce` is a random tag the author picks per send so its own session can
/// recognise an echo of that exact send. Two messages with the same sender,
/// text and timestamp are still distinct when their nonces differ. Zero means
/// untagged and is left off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author's display name
    pub sender: String,
    /// Message body
    pub text: String,
    /// Creation time, Unix milliseconds
    pub created_at: u64,
    /// Per-send tag chosen by the author, 0 if untagged
    #[serde(default, skip_serializing_if = "is_untagged")]
    pub nonce: u64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_untagged(nonce: &u64) -> bool {
    *nonce == 0
}

impl ChatMessage {
    /// Create an untagged message.
    pub fn new(sender: impl Into<String>, text: impl Into<String>, created_at: u64) -> Self {
        Self { sender: sender.into(), text: text.into(), created_at, nonce: 0 }
    }

    /// Same message tagged with `nonce`.
    #[must_use]
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// True if the author tagged this message.
    pub fn is_tagged(&self) -> bool {
        self.nonce != 0
    }

    /// Reject messages with an empty body or a blank sender.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidPayload` naming the offending field
    pub fn validate(&self) -> Result<()> {
        if self.text.is_empty() {
            return Err(ProtocolError::InvalidPayload("message text is empty".into()));
        }
        if self.sender.trim().is_empty() {
            return Err(ProtocolError::InvalidPayload("message sender is blank".into()));
        }
        Ok(())
    }
}

/// Participant's request to broadcast a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Message to broadcast
    pub message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_invalid() {
        let msg = ChatMessage::new("alice", "", 1);
        assert!(msg.validate().is_err());
    }

    #[test]
    fn blank_sender_is_invalid() {
        let msg = ChatMessage::new(" ", "hi", 1);
        assert!(msg.validate().is_err());
    }

    #[test]
    fn whitespace_text_is_a_message() {
        let msg = ChatMessage::new("alice", " ", 1);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn nonce_distinguishes_identical_content() {
        let first = ChatMessage::new("sam", "ok", 5_000).with_nonce(1);
        let second = ChatMessage::new("sam", "ok", 5_000).with_nonce(2);
        assert_ne!(first, second);
        assert!(first.is_tagged());
        assert!(!ChatMessage::new("sam", "ok", 5_000).is_tagged());
    }

    #[test]
    fn missing_nonce_decodes_as_untagged() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Legacy<'a> {
            sender: &'a str,
            text: &'a str,
            created_at: u64,
        }

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&Legacy { sender: "sam", text: "ok", created_at: 9 }, &mut buf)
            .expect("encode");

        let msg: ChatMessage = ciborium::de::from_reader(buf.as_slice()).expect("decode");
        assert_eq!(msg, ChatMessage::new("sam", "ok", 9));
    }
}
