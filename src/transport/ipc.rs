//! Unix socket transport to the presence daemon

use super::{PresenceTransport, TransportConnector, TransportEvent};
use crate::protocol::{
    deserialize, serialize_and_frame, ActivityPayload, ClientMessage, DaemonMessage, PeerIdentity,
    PresenceEvent, SubscriptionKind, PROTOCOL_VERSION,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Connects to the presence daemon's unix socket
pub struct IpcConnector {
    socket_path: PathBuf,
}

impl IpcConnector {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }
}

#[async_trait]
impl TransportConnector for IpcConnector {
    async fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PresenceTransport>> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to presence daemon at {:?}",
                    self.socket_path
                )
            })?;

        tracing::info!("Connected to presence daemon at {:?}", self.socket_path);

        let (reader, writer) = stream.into_split();
        let reader_task = tokio::spawn(read_daemon_messages(reader, events));

        Ok(Arc::new(IpcTransport {
            writer: Mutex::new(writer),
            reader_task,
        }))
    }
}

/// A live unix socket channel to the presence daemon
pub struct IpcTransport {
    /// Write half, shared by Arc clones of the transport
    writer: Mutex<OwnedWriteHalf>,

    /// Reader task feeding the owner's event channel
    reader_task: JoinHandle<()>,
}

impl IpcTransport {
    async fn send<T: Serialize>(&self, msg: &T) -> Result<()> {
        let framed = serialize_and_frame(msg)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl PresenceTransport for IpcTransport {
    async fn login(&self, client_id: &str) -> Result<()> {
        tracing::info!("Logging in to presence daemon");
        self.send(&ClientMessage::Login {
            client_id: client_id.to_string(),
            protocol_version: PROTOCOL_VERSION,
        })
        .await
    }

    async fn set_activity(&self, payload: ActivityPayload) -> Result<()> {
        self.send(&ClientMessage::SetActivity { activity: payload })
            .await
    }

    async fn subscribe(&self, event: SubscriptionKind) -> Result<()> {
        tracing::debug!("Subscribing to {:?}", event);
        self.send(&ClientMessage::Subscribe { event }).await
    }

    async fn send_join_invite(&self, user: &PeerIdentity) -> Result<()> {
        self.send(&ClientMessage::SendJoinInvite { user: user.clone() })
            .await
    }

    async fn close_join_request(&self, user: &PeerIdentity) -> Result<()> {
        self.send(&ClientMessage::CloseJoinRequest { user: user.clone() })
            .await
    }

    async fn destroy(&self) -> Result<()> {
        // Deliberate teardown: stop the reader first so no Closed event
        // races the disposal in progress.
        self.reader_task.abort();
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

/// Read a length-prefixed message from the daemon
async fn read_message(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];

    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > crate::protocol::MAX_MESSAGE_SIZE as usize {
        return Err(anyhow!("Message too large: {} bytes", len));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    Ok(Some(buffer))
}

/// Reader loop: map daemon messages to transport events until the channel drops
async fn read_daemon_messages(mut reader: OwnedReadHalf, events: mpsc::Sender<TransportEvent>) {
    loop {
        match read_message(&mut reader).await {
            Ok(Some(bytes)) => match deserialize::<DaemonMessage>(&bytes) {
                Ok(msg) => {
                    if let Some(event) = map_daemon_message(msg) {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to parse daemon message: {}", e);
                }
            },
            Ok(None) => {
                tracing::info!("Presence daemon closed the channel");
                let _ = events.send(TransportEvent::Closed).await;
                break;
            }
            Err(e) => {
                tracing::error!("Error reading from presence daemon: {}", e);
                let _ = events.send(TransportEvent::Closed).await;
                break;
            }
        }
    }

    tracing::debug!("Daemon reader task finished");
}

fn map_daemon_message(msg: DaemonMessage) -> Option<TransportEvent> {
    match msg {
        DaemonMessage::Ready { protocol_version } => {
            if protocol_version != PROTOCOL_VERSION {
                // The daemon is the authority on compatibility; keep the
                // channel until it closes it.
                tracing::warn!(
                    "Daemon protocol version {} differs from ours ({})",
                    protocol_version,
                    PROTOCOL_VERSION
                );
            }
            Some(TransportEvent::Ready)
        }
        DaemonMessage::Event(PresenceEvent::Spectate { secret }) => {
            Some(TransportEvent::Spectate { secret })
        }
        DaemonMessage::Event(PresenceEvent::Join { secret }) => {
            Some(TransportEvent::Join { secret })
        }
        DaemonMessage::Event(PresenceEvent::JoinRequest { user }) => {
            Some(TransportEvent::JoinRequest { user })
        }
        DaemonMessage::Error { message } => {
            tracing::warn!("Presence daemon reported: {}", message);
            None
        }
    }
}
