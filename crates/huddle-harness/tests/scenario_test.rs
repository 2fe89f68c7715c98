//! Multi-participant scenarios against the real relay driver.

use huddle_client::{ConnectionStatus, SessionError, SessionUpdate};
use huddle_core::ChannelError;
use huddle_harness::{InvariantRegistry, Scenario};
use huddle_proto::Opcode;
use huddle_relay::RelayConfig;

fn usernames(scenario: &Scenario, index: usize) -> Vec<String> {
    let mut names: Vec<String> = scenario
        .participant(index)
        .state()
        .roster()
        .usernames()
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn alice_and_bob_exchange_messages() {
    let invariants = InvariantRegistry::standard();
    let mut scenario = Scenario::new(7);

    let alice = scenario.join("alice").await.expect("alice joins");
    assert!(scenario.participant(alice).state().is_logged_in());
    assert_eq!(usernames(&scenario, alice), ["alice"]);
    invariants.assert_all(&scenario.snapshot(), "after alice joined");

    let bob = scenario.join("bob").await.expect("bob joins");
    assert_eq!(usernames(&scenario, alice), ["alice", "bob"]);
    assert_eq!(usernames(&scenario, bob), ["alice", "bob"]);
    invariants.assert_all(&scenario.snapshot(), "after bob joined");

    scenario.send(bob, "hello").expect("bob sends");

    let alice_history = scenario.participant(alice).state().history();
    assert_eq!(alice_history.len(), 1);
    let delivered = alice_history.last().expect("delivered");
    assert_eq!(delivered.sender, "bob");
    assert_eq!(delivered.text, "hello");

    // Bob's copy came from the local echo, not from the relay.
    assert_eq!(scenario.participant(bob).state().history().as_slice(), alice_history.as_slice());
    invariants.assert_all(&scenario.snapshot(), "after bob's message");
}

#[tokio::test]
async fn handlers_stay_single_across_many_joins() {
    let mut scenario = Scenario::new(11);
    let alice = scenario.join("alice").await.expect("alice joins");

    for n in 0..5 {
        scenario.join(&format!("guest{n}")).await.expect("guest joins");
    }

    let subscriptions = scenario.participant(alice).synchronizer().subscriptions();
    for opcode in Opcode::ALL {
        assert!(subscriptions.handler_count(opcode) <= 1, "{opcode:?}");
    }
    InvariantRegistry::standard().assert_all(&scenario.snapshot(), "after six joins");
}

#[tokio::test]
async fn leaving_shrinks_every_roster() {
    let mut scenario = Scenario::new(3);
    let alice = scenario.join("alice").await.expect("alice joins");
    let bob = scenario.join("bob").await.expect("bob joins");
    let carol = scenario.join("carol").await.expect("carol joins");

    scenario.leave(bob);

    assert_eq!(scenario.participant(bob).state().connection_status(), ConnectionStatus::Closed);
    assert!(scenario.participant(bob).state().roster().is_empty());
    assert_eq!(usernames(&scenario, alice), ["alice", "carol"]);
    assert_eq!(usernames(&scenario, carol), ["alice", "carol"]);
    InvariantRegistry::standard().assert_all(&scenario.snapshot(), "after bob left");
}

#[tokio::test]
async fn anonymous_participant_sees_no_chat() {
    let mut scenario = Scenario::new(5);
    let lurker = scenario.connect().await.expect("lurker connects");
    let alice = scenario.join("alice").await.expect("alice joins");

    scenario.send(alice, "anyone?").expect("alice sends");

    let state = scenario.participant(lurker).state();
    assert_eq!(state.greeting(), Some("Welcome to Huddle"));
    assert!(state.history().is_empty());
    assert!(state.roster().is_empty());
    assert_eq!(scenario.relay().roster().len(), 1);
    assert_eq!(scenario.relay().connection_count(), 2);

    let err = scenario.send(lurker, "hi").expect_err("not logged in");
    assert!(matches!(err, SessionError::NotLoggedIn));
}

#[tokio::test]
async fn duplicate_usernames_are_distinct_participants() {
    let mut scenario = Scenario::new(9);
    let first = scenario.join("sam").await.expect("first sam");
    let second = scenario.join("sam").await.expect("second sam");

    assert_eq!(usernames(&scenario, first), ["sam", "sam"]);
    assert_ne!(
        scenario.participant(first).channel().connection_id(),
        scenario.participant(second).channel().connection_id()
    );

    scenario.send(second, "which sam?").expect("send");
    assert_eq!(scenario.participant(first).state().history().len(), 1);
    InvariantRegistry::standard().assert_all(&scenario.snapshot(), "after duplicate names");
}

#[tokio::test]
async fn relay_refuses_connections_past_capacity() {
    let config = RelayConfig { max_connections: 1, ..RelayConfig::default() };
    let mut scenario = Scenario::with_config(1, config);

    let alice = scenario.join("alice").await.expect("alice joins");
    let late = scenario.connect().await.expect("channel opens");

    let state = scenario.participant(late).state();
    assert_eq!(state.connection_status(), ConnectionStatus::Closed);
    assert!(state.greeting().is_none());
    assert!(scenario.participant(alice).state().is_logged_in());
    assert_eq!(scenario.relay().connection_count(), 1);
    InvariantRegistry::standard().assert_all(&scenario.snapshot(), "after refusal");
}

#[tokio::test]
async fn second_login_is_refused_locally() {
    let mut scenario = Scenario::new(13);
    let alice = scenario.join("alice").await.expect("alice joins");
    let delivered = scenario.relay().frames_delivered();

    let err = scenario.participant_mut(alice).submit_username("again").expect_err("rejected");
    assert!(matches!(err, SessionError::AlreadyLoggedIn));
    assert_eq!(scenario.relay().frames_delivered(), delivered);
    assert_eq!(scenario.relay().roster().usernames().collect::<Vec<_>>(), ["alice"]);
}

#[tokio::test]
async fn own_message_is_not_echoed_back() {
    let mut scenario = Scenario::new(17);
    let alice = scenario.join("alice").await.expect("alice joins");
    let bob = scenario.join("bob").await.expect("bob joins");

    scenario.send(alice, "one").expect("send");
    scenario.send(alice, "two").expect("send");
    let updates = scenario.settle();

    assert!(updates.iter().all(|(_, u)| !matches!(u, SessionUpdate::MessageReceived(_))));
    let texts: Vec<_> =
        scenario.participant(alice).state().history().iter().map(|m| m.text.clone()).collect();
    assert_eq!(texts, ["one", "two"]);
    assert_eq!(
        scenario.participant(bob).state().history().as_slice(),
        scenario.participant(alice).state().history().as_slice()
    );
}

#[tokio::test]
async fn namesakes_sending_identical_text_in_one_millisecond_both_land() {
    let mut scenario = Scenario::new(19);
    let first = scenario.join("sam").await.expect("first sam");
    let second = scenario.join("sam").await.expect("second sam");
    let watcher = scenario.join("wren").await.expect("wren joins");

    // No clock advance between the two sends.
    scenario.participant_mut(first).send_message("ok").expect("first sends");
    scenario.participant_mut(second).send_message("ok").expect("second sends");
    scenario.settle();

    for index in [first, second, watcher] {
        let history = scenario.participant(index).state().history().as_slice();
        assert_eq!(history.len(), 2, "participant {index}");
        assert_eq!(history[0].created_at, history[1].created_at);
    }
    InvariantRegistry::standard().assert_all(&scenario.snapshot(), "after namesake sends");
}

#[tokio::test]
async fn send_on_dropped_connection_leaves_history_alone() {
    let mut scenario = Scenario::new(23);
    let alice = scenario.join("alice").await.expect("alice joins");
    let bob = scenario.join("bob").await.expect("bob joins");
    scenario.send(alice, "before").expect("send");

    let connection_id = scenario.participant(alice).channel().connection_id().expect("id");
    scenario.relay().disconnect(connection_id);

    let err = scenario.participant_mut(alice).send_message("lost").expect_err("channel gone");
    assert!(matches!(err, SessionError::Channel(ChannelError::Closed)));

    let texts: Vec<_> =
        scenario.participant(alice).state().history().iter().map(|m| m.text.clone()).collect();
    assert_eq!(texts, ["before"]);
    assert_eq!(scenario.participant(alice).state().connection_status(), ConnectionStatus::Closed);

    scenario.settle();
    assert_eq!(scenario.participant(bob).state().history().len(), 1);
    assert_eq!(usernames(&scenario, bob), ["bob"]);
    InvariantRegistry::standard().assert_all(&scenario.snapshot(), "after dropped send");
}
