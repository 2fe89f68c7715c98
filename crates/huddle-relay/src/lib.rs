//! Huddle relay.
//!
//! The relay is the hub every participant connects to. It assigns connection
//! IDs, tracks who is logged in, and fans chat messages out to everyone but
//! their sender.
//!
//! # Architecture
//!
//! [`RelayDriver`] is Sans-IO: it turns [`RelayEvent`]s into [`RelayAction`]s
//! and never touches a socket. [`Relay`] is the production runtime that
//! executes those actions over TCP with Tokio; the simulation harness drives
//! the same driver in-process.
//!
//! Each connection gets a reader loop and exactly one writer task fed by an
//! unbounded queue. Actions are executed while the driver lock is held, so
//! every recipient sees frames in the order the driver produced them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
pub mod presence;

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

pub use driver::{DriverError, LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use error::RelayError;
use huddle_core::{
    SystemEnv,
    wire::{read_frame, write_frame},
};
use huddle_proto::{ConnectionId, Frame};
pub use presence::{ConnectionInfo, PresenceRegistry, RegistryError};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::{Mutex, Notify, RwLock, mpsc},
};

/// Relay runtime configuration.
#[derive(Debug, Clone)]
pub struct RelayRuntimeConfig {
    /// Address to bind to (e.g. "0.0.0.0:7878")
    pub bind_address: String,
    /// Driver configuration (greeting, limits)
    pub driver: RelayConfig,
}

impl Default for RelayRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:7878".to_string(), driver: RelayConfig::default() }
    }
}

/// Outbound side of one live connection.
struct ConnectionHandle {
    /// Queue drained by the connection's writer task
    outbound: mpsc::UnboundedSender<Frame>,
    /// Wakes the reader loop when the relay closes the connection
    shutdown: Arc<Notify>,
}

/// Connections by ID, for routing driver actions.
type Connections = RwLock<HashMap<ConnectionId, ConnectionHandle>>;

/// Production Huddle relay over TCP.
pub struct Relay {
    driver: RelayDriver<SystemEnv>,
    listener: TcpListener,
}

impl Relay {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// - `RelayError::Bind` if the address cannot be bound
    pub async fn bind(config: RelayRuntimeConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| RelayError::Bind { addr: config.bind_address.clone(), source })?;
        let driver = RelayDriver::new(SystemEnv::new(), config.driver);

        Ok(Self { driver, listener })
    }

    /// Local address the relay is bound to.
    ///
    /// # Errors
    ///
    /// - `RelayError::Transport` if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is cancelled.
    ///
    /// # Errors
    ///
    /// Does not return under normal operation; accept failures are logged and
    /// retried.
    pub async fn run(self) -> Result<(), RelayError> {
        tracing::info!("relay listening on {}", self.listener.local_addr()?);

        let driver = Arc::new(Mutex::new(self.driver));
        let connections: Arc<Connections> = Arc::new(RwLock::new(HashMap::new()));

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let driver = Arc::clone(&driver);
                    let connections = Arc::clone(&connections);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, driver, connections).await {
                            tracing::warn!(%peer, error = %e, "connection ended with error");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                },
            }
        }
    }
}

/// Serve one TCP connection from accept to close.
async fn handle_connection(
    stream: TcpStream,
    driver: Arc<Mutex<RelayDriver<SystemEnv>>>,
    connections: Arc<Connections>,
) -> Result<(), RelayError> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let shutdown = Arc::new(Notify::new());

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                tracing::warn!(error = %e, "write failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let connection_id = {
        let mut driver = driver.lock().await;
        let connection_id = driver.allocate_connection_id();

        connections.write().await.insert(
            connection_id,
            ConnectionHandle { outbound: outbound_tx, shutdown: Arc::clone(&shutdown) },
        );

        let actions = driver.process_event(RelayEvent::ConnectionAccepted { connection_id })?;
        execute_actions(&driver, actions, &connections).await;
        connection_id
    };

    let reason = loop {
        let frame = tokio::select! {
            result = read_frame(&mut reader) => match result {
                Ok(Some(frame)) => frame,
                Ok(None) => break "peer closed".to_string(),
                Err(e) => break format!("read failed: {e}"),
            },
            () = shutdown.notified() => break "closed by relay".to_string(),
        };

        let mut driver = driver.lock().await;
        match driver.process_event(RelayEvent::FrameReceived { connection_id, frame }) {
            Ok(actions) => execute_actions(&driver, actions, &connections).await,
            Err(e) => tracing::warn!(%connection_id, error = %e, "frame processing failed"),
        }
    };

    connections.write().await.remove(&connection_id);

    let mut driver = driver.lock().await;
    let actions = driver.process_event(RelayEvent::ConnectionClosed { connection_id, reason })?;
    execute_actions(&driver, actions, &connections).await;

    Ok(())
}

/// Execute driver actions. Caller holds the driver lock.
async fn execute_actions(
    driver: &RelayDriver<SystemEnv>,
    actions: Vec<RelayAction>,
    connections: &Connections,
) {
    for action in actions {
        match action {
            RelayAction::SendToConnection { connection_id, frame } => {
                let connections = connections.read().await;
                match connections.get(&connection_id) {
                    Some(handle) => send(connection_id, handle, frame),
                    None => tracing::debug!(%connection_id, "send to departed connection"),
                }
            },

            RelayAction::Broadcast { frame, exclude } => {
                let connections = connections.read().await;
                for connection_id in driver.logged_in() {
                    if Some(connection_id) == exclude {
                        continue;
                    }
                    if let Some(handle) = connections.get(&connection_id) {
                        send(connection_id, handle, frame.clone());
                    }
                }
            },

            RelayAction::CloseConnection { connection_id, reason } => {
                tracing::info!(%connection_id, "closing connection: {reason}");
                // Dropping the queue lets the writer flush what is already
                // queued before it shuts the socket.
                if let Some(handle) = connections.write().await.remove(&connection_id) {
                    handle.shutdown.notify_one();
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

fn send(connection_id: ConnectionId, handle: &ConnectionHandle, frame: Frame) {
    if handle.outbound.send(frame).is_err() {
        tracing::warn!(%connection_id, "writer gone, dropping frame");
    }
}
