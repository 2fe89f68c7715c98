//! End-to-end tests against a real relay over loopback TCP.

use std::{net::SocketAddr, time::Duration};

use huddle_client::{ConnectionStatus, Session, SessionState, TcpChannel};
use huddle_core::SystemEnv;
use huddle_relay::{Relay, RelayConfig, RelayRuntimeConfig};

type TcpSession = Session<TcpChannel, SystemEnv>;

async fn start_relay(config: RelayConfig) -> SocketAddr {
    let relay = Relay::bind(RelayRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        driver: config,
    })
    .await
    .expect("bind relay");
    let addr = relay.local_addr().expect("local addr");
    tokio::spawn(relay.run());
    addr
}

async fn wait_until(session: &mut TcpSession, what: &str, done: impl Fn(&SessionState) -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !done(session.state()) {
            if session.next_event().await.is_none() {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
    assert!(done(session.state()), "session ended before {what}");
}

async fn join(addr: SocketAddr, name: &str) -> TcpSession {
    let mut session = Session::new(TcpChannel::new(addr.to_string()), SystemEnv::new());
    session.open().await.expect("open");
    wait_until(&mut session, "greeting", |s| s.greeting().is_some()).await;

    session.submit_username(name).expect("submit username");
    wait_until(&mut session, "login-ack", SessionState::is_logged_in).await;
    session
}

#[tokio::test]
async fn two_participants_chat_over_tcp() {
    let addr = start_relay(RelayConfig::default()).await;

    let mut alice = join(addr, "alice").await;
    assert_eq!(alice.state().roster().usernames().collect::<Vec<_>>(), vec!["alice"]);

    let mut bob = join(addr, "bob").await;
    assert_eq!(bob.state().roster().len(), 2);
    wait_until(&mut alice, "bob in roster", |s| s.roster().len() == 2).await;

    alice.send_message("hi bob").expect("send");
    wait_until(&mut bob, "message", |s| s.history().len() == 1).await;

    let received = bob.state().history().last().expect("message").clone();
    assert_eq!(received.sender, "alice");
    assert_eq!(received.text, "hi bob");
    assert_eq!(alice.state().history().as_slice(), &[received]);

    bob.close();
    assert_eq!(bob.state().connection_status(), ConnectionStatus::Closed);
    wait_until(&mut alice, "bob leaving", |s| s.roster().len() == 1).await;
    assert_eq!(alice.state().history().len(), 1);
}

#[tokio::test]
async fn relay_at_capacity_refuses_connection() {
    let addr = start_relay(RelayConfig { max_connections: 1, ..RelayConfig::default() }).await;

    let _alice = join(addr, "alice").await;

    let mut late = Session::new(TcpChannel::new(addr.to_string()), SystemEnv::new());
    late.open().await.expect("tcp connect still succeeds");
    wait_until(&mut late, "refusal", |s| s.connection_status() == ConnectionStatus::Closed)
        .await;
    assert!(late.state().greeting().is_none());
}
