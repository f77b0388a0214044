//! Message types exchanged with the presence daemon

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from beacon to the presence daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Handshake carrying the client identity and protocol version
    Login {
        client_id: String,
        protocol_version: u32,
    },

    /// Push the current activity payload for broadcast
    SetActivity { activity: ActivityPayload },

    /// Ask the daemon to forward a class of inbound events
    Subscribe { event: SubscriptionKind },

    /// Accept a pending join request from a collaborator
    SendJoinInvite { user: PeerIdentity },

    /// Decline a pending join request from a collaborator
    CloseJoinRequest { user: PeerIdentity },
}

/// Messages sent from the presence daemon to beacon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonMessage {
    /// Handshake completed, the channel is usable
    Ready { protocol_version: u32 },

    /// An inbound subscription event
    Event(PresenceEvent),

    /// Daemon-side error report
    Error { message: String },
}

/// Inbound events the daemon forwards after a matching Subscribe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PresenceEvent {
    /// Another user started spectating; the secret encodes the session locator
    Spectate { secret: String },

    /// Another user accepted an invite; the secret encodes the session locator
    Join { secret: String },

    /// Another user requests permission to join our session
    JoinRequest { user: PeerIdentity },
}

/// Event classes a client may subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionKind {
    ActivitySpectate,
    ActivityJoin,
    ActivityJoinRequest,
}

/// Identity of a collaborator as reported by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub id: Uuid,
    pub name: String,
}

/// Broadcast payload produced by the activity builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// First presence line
    pub details: Option<String>,

    /// Second presence line
    pub state: Option<String>,

    /// Elapsed-time anchor, unix millis
    pub start_timestamp: Option<i64>,

    /// Collaboration party, present only while a session is active
    pub party: Option<PartyInfo>,

    /// Opaque secret granting join access, present only when joins are allowed
    pub join_secret: Option<String>,

    /// Opaque secret granting spectate access, present only when allowed
    pub spectate_secret: Option<String>,
}

/// Party identity and size shown in the broadcast payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyInfo {
    pub id: String,
    pub size: u32,
    pub max_size: u32,
}
