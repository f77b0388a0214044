//! Session bridge - boundary to the host's collaboration API

use crate::protocol::PeerIdentity;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted by the collaboration API
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The collaboration session started, changed, or ended.
    /// `id` is None when no session is active.
    SessionChanged { id: Option<String> },

    /// Participants joined or left the session
    PeersChanged {
        added: Vec<PeerIdentity>,
        removed: Vec<PeerIdentity>,
    },
}

/// Access point to the collaboration API.
///
/// `api()` returns None when collaboration is unavailable in this host;
/// every dependent feature then silently does nothing.
pub trait SessionBridge: Send + Sync {
    fn api(&self) -> Option<Arc<dyn SessionApi>>;
}

/// The collaboration API surface the connection manager consumes
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Identity of the current session, None while working solo
    fn session_id(&self) -> Option<String>;

    /// Subscribe to session and peer change events
    fn events(&self) -> broadcast::Receiver<SessionEvent>;

    /// Join a session by its resource locator
    async fn join(&self, locator: &str) -> Result<()>;
}

/// Bridge for hosts without a collaboration API
pub struct NullSessionBridge;

impl SessionBridge for NullSessionBridge {
    fn api(&self) -> Option<Arc<dyn SessionApi>> {
        None
    }
}

/// Locator granting join access to a session
pub fn join_locator(session_id: &str) -> String {
    format!("collab://join/{}", session_id)
}

/// Locator granting spectate access to a session
pub fn spectate_locator(session_id: &str) -> String {
    format!("collab://spectate/{}", session_id)
}

/// Encode a session locator into the opaque secret carried by the daemon
pub fn secret_from_locator(locator: &str) -> String {
    BASE64.encode(locator.as_bytes())
}

/// Decode an opaque daemon secret back into a session locator
pub fn locator_from_secret(secret: &str) -> Result<String> {
    let bytes = BASE64
        .decode(secret)
        .map_err(|e| anyhow!("Invalid secret encoding: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow!("Secret is not valid UTF-8: {}", e))
}
