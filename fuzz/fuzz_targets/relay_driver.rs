//! Fuzz target for the relay driver
//!
//! Drives a `RelayDriver` with arbitrary connects, disconnects and raw frames
//! (valid logins and messages mixed with garbage) and checks its bookkeeping:
//!
//! - `process_event` never panics
//! - every roster the relay emits lists only logged-in connections
//! - no action targets a connection the relay does not know
//! - the registry never exceeds `max_connections`

#![no_main]

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use arbitrary::Arbitrary;
use bytes::Bytes;
use huddle_core::Environment;
use huddle_proto::{
    ChatMessage, ConnectionId, Frame, FrameHeader, LoginRequest, Opcode, Payload, SendMessage,
};
use huddle_relay::{RelayAction, RelayConfig, RelayDriver, RelayEvent};
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Default)]
struct CounterEnv(Arc<AtomicU64>);

impl Environment for CounterEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock_millis(&self) -> u64 {
        0
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let n = self.0.fetch_add(1, Ordering::Relaxed);
        for (dst, src) in buffer.iter_mut().zip(n.to_be_bytes().iter().cycle()) {
            *dst = *src;
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    Connect,
    Disconnect(u8),
    Login(u8, String),
    Send(u8, String, String),
    Raw(u8, u16, Vec<u8>),
}

const MAX_CONNECTIONS: usize = 8;

fuzz_target!(|ops: Vec<Op>| {
    let mut driver = RelayDriver::new(
        CounterEnv::default(),
        RelayConfig { max_connections: MAX_CONNECTIONS, ..RelayConfig::default() },
    );
    let mut open: Vec<ConnectionId> = Vec::new();

    for op in ops {
        let pick = |i: u8| (!open.is_empty()).then(|| open[usize::from(i) % open.len()]);

        let event = match op {
            Op::Connect => {
                let connection_id = driver.allocate_connection_id();
                open.push(connection_id);
                RelayEvent::ConnectionAccepted { connection_id }
            },
            Op::Disconnect(i) => {
                let Some(connection_id) = pick(i) else { continue };
                open.retain(|id| *id != connection_id);
                RelayEvent::ConnectionClosed { connection_id, reason: "fuzz".to_string() }
            },
            Op::Login(i, username) => {
                let Some(connection_id) = pick(i) else { continue };
                let Ok(frame) = Payload::LoginRequest(LoginRequest::new(username)).into_frame()
                else {
                    continue;
                };
                RelayEvent::FrameReceived { connection_id, frame }
            },
            Op::Send(i, sender, text) => {
                let Some(connection_id) = pick(i) else { continue };
                let message = SendMessage { message: ChatMessage::new(sender, text, 0) };
                let Ok(frame) = Payload::SendMessage(message).into_frame() else { continue };
                RelayEvent::FrameReceived { connection_id, frame }
            },
            Op::Raw(i, opcode, body) => {
                let Some(connection_id) = pick(i) else { continue };
                let header = Opcode::from_u16(opcode)
                    .map_or_else(|| FrameHeader::new(Opcode::Error), FrameHeader::new);
                let frame = Frame::new(header, Bytes::from(body));
                RelayEvent::FrameReceived { connection_id, frame }
            },
        };

        // Frames from connections the relay refused are a caller error.
        let Ok(actions) = driver.process_event(event) else { continue };

        let known: BTreeSet<ConnectionId> = open.iter().copied().collect();
        let logged_in: BTreeSet<ConnectionId> = driver.logged_in().collect();

        for action in &actions {
            match action {
                RelayAction::SendToConnection { connection_id, frame }
                | RelayAction::Broadcast { exclude: Some(connection_id), frame } => {
                    assert!(known.contains(connection_id));
                    check_roster(frame, &logged_in);
                },
                RelayAction::Broadcast { exclude: None, frame } => check_roster(frame, &logged_in),
                RelayAction::CloseConnection { connection_id, .. } => {
                    assert!(known.contains(connection_id));
                    open.retain(|id| id != connection_id);
                },
                RelayAction::Log { .. } => {},
            }
        }

        assert!(driver.registry().connection_count() <= MAX_CONNECTIONS);
    }
});

fn check_roster(frame: &Frame, logged_in: &BTreeSet<ConnectionId>) {
    if let Ok(Payload::LoginAck(roster) | Payload::RosterChanged(roster)) =
        Payload::from_frame(frame)
    {
        let listed: BTreeSet<ConnectionId> = roster.iter().map(|p| p.connection_id).collect();
        assert_eq!(&listed, logged_in);
    }
}
