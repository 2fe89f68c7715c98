//! Text rendering of session updates.

use huddle_client::SessionUpdate;
use huddle_proto::Roster;

/// One line of terminal output for `update`, or `None` if it is not shown.
pub fn render_update(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::Connected => None,
        SessionUpdate::Greeted { text } => Some(format!("* {text}")),
        SessionUpdate::LoggedIn { roster } => {
            Some(format!("* logged in, online: {}", online(roster)))
        },
        SessionUpdate::RosterChanged { roster } => Some(format!("* online: {}", online(roster))),
        SessionUpdate::MessageReceived(message) => {
            Some(format!("<{}> {}", message.sender, message.text))
        },
        SessionUpdate::RelayError { code, message } => {
            Some(format!("! relay error {code}: {message}"))
        },
        SessionUpdate::Disconnected => Some("* disconnected".to_string()),
    }
}

fn online(roster: &Roster) -> String {
    if roster.is_empty() {
        return "nobody".to_string();
    }
    roster.usernames().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use huddle_proto::{ChatMessage, ConnectionId, Participant};

    use super::*;

    #[test]
    fn renders_roster_in_id_order() {
        let roster: Roster = [
            Participant::new(ConnectionId(2), "bob"),
            Participant::new(ConnectionId(1), "alice"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            render_update(&SessionUpdate::RosterChanged { roster }).as_deref(),
            Some("* online: alice, bob")
        );
    }

    #[test]
    fn renders_messages_with_sender() {
        let update = SessionUpdate::MessageReceived(ChatMessage::new("bob", "hello", 0));
        assert_eq!(render_update(&update).as_deref(), Some("<bob> hello"));
    }

    #[test]
    fn empty_roster_reads_nobody() {
        let update = SessionUpdate::LoggedIn { roster: Roster::new() };
        assert_eq!(render_update(&update).as_deref(), Some("* logged in, online: nobody"));
    }

    #[test]
    fn connected_is_silent() {
        assert_eq!(render_update(&SessionUpdate::Connected), None);
    }
}
