//! TCP event channel.
//!
//! [`TcpChannel`] carries frames over one TCP connection. A reader task decodes
//! inbound frames into a queue; a writer task drains an outbound queue onto the
//! socket. One writer per connection keeps frames in emit order.

use huddle_core::{
    ChannelError, EventChannel,
    wire::{read_frame, write_frame},
};
use huddle_proto::Frame;
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc,
    task::AbortHandle,
};

/// Event channel over TCP.
pub struct TcpChannel {
    server_addr: String,
    link: Option<Link>,
    closed: bool,
}

/// Queues and tasks of an open connection.
struct Link {
    to_server: mpsc::UnboundedSender<Frame>,
    from_server: mpsc::UnboundedReceiver<Frame>,
    tasks: [AbortHandle; 2],
}

impl TcpChannel {
    /// Channel to `server_addr` (`host:port`). Nothing connects until
    /// [`EventChannel::open`].
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self { server_addr: server_addr.into(), link: None, closed: false }
    }

    /// Address this channel connects to.
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }
}

impl EventChannel for TcpChannel {
    async fn open(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if self.link.is_some() {
            return Ok(());
        }

        let stream = TcpStream::connect(&self.server_addr)
            .await
            .map_err(|e| ChannelError::Connect(format!("{}: {e}", self.server_addr)))?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let (to_server_tx, mut to_server_rx) = mpsc::unbounded_channel::<Frame>();
        let (from_server_tx, from_server_rx) = mpsc::unbounded_channel::<Frame>();

        let read_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if from_server_tx.send(frame).is_err() {
                            break;
                        }
                    },
                    Ok(None) => {
                        tracing::debug!("relay closed the connection");
                        break;
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping connection after read error");
                        break;
                    },
                }
            }
        });

        let write_task = tokio::spawn(async move {
            while let Some(frame) = to_server_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    tracing::warn!(error = %e, "write to relay failed");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        tracing::debug!(addr = %self.server_addr, "connected");
        self.link = Some(Link {
            to_server: to_server_tx,
            from_server: from_server_rx,
            tasks: [read_task.abort_handle(), write_task.abort_handle()],
        });
        Ok(())
    }

    fn emit(&mut self, frame: Frame) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let link = self.link.as_ref().ok_or(ChannelError::NotOpen)?;
        link.to_server.send(frame).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Option<Frame> {
        match self.link.as_mut() {
            Some(link) => link.from_server.recv().await,
            None => None,
        }
    }

    fn try_recv(&mut self) -> Option<Frame> {
        self.link.as_mut()?.from_server.try_recv().ok()
    }

    fn is_open(&self) -> bool {
        !self.closed && self.link.as_ref().is_some_and(|link| !link.to_server.is_closed())
    }

    fn close(&mut self) {
        self.closed = true;
        if let Some(link) = self.link.take() {
            // Dropping the sender lets the writer flush what is queued.
            drop(link.to_server);
            link.tasks[0].abort();
        }
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            for task in &link.tasks {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_before_open_is_not_open() {
        let mut channel = TcpChannel::new("127.0.0.1:1");
        let frame = Frame::new(huddle_proto::FrameHeader::new(huddle_proto::Opcode::Greeting), vec![]);
        assert_eq!(channel.emit(frame), Err(ChannelError::NotOpen));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn open_after_close_fails() {
        let mut channel = TcpChannel::new("127.0.0.1:1");
        channel.close();
        assert_eq!(channel.open().await, Err(ChannelError::Closed));
    }
}
