//! Standard invariant checks.

use std::collections::HashSet;

use huddle_client::ConnectionStatus;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Every event has at most one handler, however many greetings arrived.
pub struct SingleSubscription;

impl Invariant for SingleSubscription {
    fn name(&self) -> &'static str {
        "single_subscription"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (index, participant) in state.participants.iter().enumerate() {
            if participant.max_handler_count > 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "participant {index}: {} handlers registered for one event",
                        participant.max_handler_count
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A connected participant believes it is logged in exactly when the relay
/// lists it. A closed participant is logged out and sees an empty roster.
pub struct LoginConsistency;

impl Invariant for LoginConsistency {
    fn name(&self) -> &'static str {
        "login_consistency"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (index, participant) in state.participants.iter().enumerate() {
            let listed =
                participant.connection_id.is_some_and(|id| state.relay_roster.contains(id));

            let consistent = match participant.status {
                ConnectionStatus::Connecting => !participant.logged_in,
                ConnectionStatus::Connected => participant.logged_in == listed,
                ConnectionStatus::Closed => {
                    !participant.logged_in && !listed && participant.roster.is_empty()
                },
            };

            if !consistent {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "participant {index} ({:?}): logged_in={} but relay lists it: {}",
                        participant.status, participant.logged_in, listed
                    ),
                });
            }
        }
        Ok(())
    }
}

/// At quiescence every logged-in participant holds the relay's roster.
pub struct RosterConvergence;

impl Invariant for RosterConvergence {
    fn name(&self) -> &'static str {
        "roster_convergence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let live = state
            .participants
            .iter()
            .enumerate()
            .filter(|(_, p)| p.logged_in && p.status == ConnectionStatus::Connected);

        for (index, participant) in live {
            if participant.roster != state.relay_roster {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "participant {index} sees {:?}, relay has {:?}",
                        participant.roster.usernames().collect::<Vec<_>>(),
                        state.relay_roster.usernames().collect::<Vec<_>>()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// No send is appended to a history twice, own echoes included.
///
/// A send is identified by sender and nonce. Equal text and timestamp alone
/// do not make two messages the same send. Untagged messages cannot be told
/// apart and are not checked.
pub struct NoDuplicateMessages;

impl Invariant for NoDuplicateMessages {
    fn name(&self) -> &'static str {
        "no_duplicate_messages"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for (index, participant) in state.participants.iter().enumerate() {
            let mut seen = HashSet::new();
            for message in participant.history.iter().filter(|m| m.is_tagged()) {
                if !seen.insert((message.sender.as_str(), message.nonce)) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "participant {index}: {:?} from {} appears twice",
                            message.text, message.sender
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
