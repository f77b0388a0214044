//! Presence transport - IPC client abstraction over the presence daemon

mod ipc;

pub use ipc::{IpcConnector, IpcTransport};

use crate::protocol::{ActivityPayload, PeerIdentity, SubscriptionKind};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events a transport delivers to its owner
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake with the daemon completed
    Ready,

    /// The underlying channel dropped
    Closed,

    /// Inbound spectate secret
    Spectate { secret: String },

    /// Inbound join secret
    Join { secret: String },

    /// Inbound join request awaiting mediation
    JoinRequest { user: PeerIdentity },
}

/// Connection to the presence daemon.
///
/// Captures exactly the operations the connection manager needs, so the
/// core stays independent of the concrete IPC channel and testable with a
/// fake transport.
#[async_trait]
pub trait PresenceTransport: Send + Sync {
    /// Issue the handshake; `TransportEvent::Ready` follows on success
    async fn login(&self, client_id: &str) -> Result<()>;

    /// Push an activity payload for broadcast
    async fn set_activity(&self, payload: ActivityPayload) -> Result<()>;

    /// Ask the daemon to start forwarding a class of events
    async fn subscribe(&self, event: SubscriptionKind) -> Result<()>;

    /// Accept a pending join request
    async fn send_join_invite(&self, user: &PeerIdentity) -> Result<()>;

    /// Decline a pending join request
    async fn close_join_request(&self, user: &PeerIdentity) -> Result<()>;

    /// Tear the connection down. Safe to call even if the handshake never
    /// completed; the caller logs and discards the error.
    async fn destroy(&self) -> Result<()>;
}

/// Creates transports bound to a daemon endpoint
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Open a channel to the daemon. Events flow into `events` until the
    /// transport is destroyed or the channel drops.
    async fn connect(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PresenceTransport>>;
}
