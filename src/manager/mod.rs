//! Connection manager - presence connection lifecycle and event bridging
//!
//! Owns one presence transport at a time and drives it through
//! login -> ready -> periodic refresh -> closed/disposed. Session bridge
//! events become activity mutations; inbound daemon events become session
//! joins or mediated join requests. All asynchrony funnels into a single
//! event queue dispatched by `run`, so handlers run to completion without
//! locks.

use crate::activity::Activity;
use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::Config;
use crate::editor::{DeclinePrompt, JoinDecision, JoinPrompt, LogStatus, StatusSurface};
use crate::protocol::{PeerIdentity, SubscriptionKind};
use crate::session::{self, NullSessionBridge, SessionApi, SessionBridge, SessionEvent};
use crate::transport::{PresenceTransport, TransportConnector, TransportEvent};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Period between activity refreshes
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// How long the "connected" status text stays up before reverting
pub const STATUS_REVERT_DELAY: Duration = Duration::from_secs(5);

/// Grace period before subscribing to join requests; the daemon settles its
/// subscription acknowledgement path shortly after the handshake
pub const JOIN_REQUEST_SUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Grace period before subscribing to join secrets
pub const JOIN_SUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// Command id surfaced on the status item when a reconnect is needed
pub const RECONNECT_COMMAND: &str = "beacon.reconnect";

const STATUS_CONNECTED_TEXT: &str = "Connected to presence";
const STATUS_IDLE_TEXT: &str = "Presence";
const STATUS_RECONNECT_TEXT: &str = "Reconnect to presence";

const EVENT_QUEUE_SIZE: usize = 256;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No transport
    Idle,
    /// Transport created, login in flight
    Connecting,
    /// Handshake completed, refresh timer active
    Ready,
}

/// Everything the manager's dispatch loop reacts to
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// From the presence transport
    Transport(TransportEvent),

    /// From the collaboration session bridge
    Session(SessionEvent),

    /// Periodic activity refresh
    RefreshTick,
}

/// Handle to the running refresh task.
///
/// At most one exists per manager; `ConnectionManager::start_refresh` is
/// the only start site and always cancels the previous timer first.
struct RefreshTimer {
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    fn start(events: mpsc::Sender<ManagerEvent>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The ready transition already pushed once; skip the immediate tick
            interval.tick().await;
            loop {
                interval.tick().await;
                if events.send(ManagerEvent::RefreshTick).await.is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }

    fn cancel(self) {
        self.handle.abort();
    }
}

/// The presence connection core
pub struct ConnectionManager {
    /// Client identifier presented to the daemon, fixed at construction
    client_id: String,

    /// Configuration captured at construction, re-read once per refresh tick
    config: Config,

    state: ConnState,

    /// None means "not connected"; every operation that needs a ready
    /// connection no-ops silently while this is None
    transport: Option<Arc<dyn PresenceTransport>>,

    activity: Activity,

    /// The singleton refresh timer
    refresh: Option<RefreshTimer>,

    connector: Arc<dyn TransportConnector>,
    session: Arc<dyn SessionBridge>,
    status: Arc<dyn StatusSurface>,
    prompt: Arc<dyn JoinPrompt>,
    clipboard: Arc<dyn Clipboard>,

    events_tx: mpsc::Sender<ManagerEvent>,
    events_rx: Option<mpsc::Receiver<ManagerEvent>>,

    /// Forwards transport events into the manager queue
    transport_pump: Option<JoinHandle<()>>,

    /// Forwards session bridge events into the manager queue
    session_pump: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create an idle manager. Collaborator surfaces default to the
    /// headless implementations; override them with the `with_*` builders.
    pub fn new(config: Config, connector: Arc<dyn TransportConnector>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let client_id = config.presence.client_id.clone();
        Self {
            client_id,
            config,
            state: ConnState::Idle,
            transport: None,
            activity: Activity::new(),
            refresh: None,
            connector,
            session: Arc::new(NullSessionBridge),
            status: Arc::new(LogStatus),
            prompt: Arc::new(DeclinePrompt),
            clipboard: Arc::new(SystemClipboard),
            events_tx,
            events_rx: Some(events_rx),
            transport_pump: None,
            session_pump: None,
        }
    }

    pub fn with_session(mut self, session: Arc<dyn SessionBridge>) -> Self {
        self.session = session;
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusSurface>) -> Self {
        self.status = status;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn JoinPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn refresh_active(&self) -> bool {
        self.refresh.is_some()
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Connect to the presence daemon and issue the login handshake.
    ///
    /// No-op while a transport is already present, so at most one is ever
    /// live. On failure the partial connection is disposed and the error
    /// propagated; the caller may retry.
    pub async fn login(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Ok(());
        }

        let (transport_tx, mut transport_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let transport = self.connector.connect(transport_tx).await?;

        let tx = self.events_tx.clone();
        if let Some(pump) = self.transport_pump.take() {
            pump.abort();
        }
        self.transport_pump = Some(tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                if tx.send(ManagerEvent::Transport(event)).await.is_err() {
                    break;
                }
            }
        }));

        self.state = ConnState::Connecting;
        self.transport = Some(Arc::clone(&transport));

        if let Err(e) = transport.login(&self.client_id).await {
            // Leave nothing half-connected behind
            self.dispose().await;
            return Err(e);
        }
        Ok(())
    }

    /// Tear everything down. Callable from any state, safe to repeat,
    /// never fails.
    pub async fn dispose(&mut self) {
        self.activity.dispose();

        if let Some(transport) = self.transport.take() {
            // Teardown must never surface an error; log and move on
            if let Err(e) = transport.destroy().await {
                tracing::warn!("Failed to destroy transport: {}", e);
            }
        }

        if let Some(refresh) = self.refresh.take() {
            refresh.cancel();
        }
        if let Some(pump) = self.session_pump.take() {
            pump.abort();
        }
        if let Some(pump) = self.transport_pump.take() {
            pump.abort();
        }

        self.status.set_tooltip("");
        self.state = ConnState::Idle;
    }

    /// Generate the current activity payload and push it to the daemon.
    /// Silent no-op while disconnected.
    pub async fn set_activity(&self, session_elapsed: bool) -> Result<()> {
        let Some(transport) = self.transport.as_ref() else {
            return Ok(());
        };
        let payload = self.activity.generate(session_elapsed).await?;
        tracing::debug!("Pushing activity to presence daemon");
        transport.set_activity(payload).await
    }

    /// Advertise a spectate secret in the broadcast payload. The next
    /// periodic or explicit push picks up the change.
    pub fn allow_spectate(&mut self) {
        if self.transport.is_none() {
            return;
        }
        tracing::info!("Spectating allowed");
        self.activity.allow_spectate();
    }

    pub fn disable_spectate(&mut self) {
        if self.transport.is_none() {
            return;
        }
        tracing::info!("Spectating disabled");
        self.activity.disable_spectate();
    }

    /// Advertise a join secret in the broadcast payload. The next periodic
    /// or explicit push picks up the change.
    pub fn allow_join_requests(&mut self) {
        if self.transport.is_none() {
            return;
        }
        tracing::info!("Join requests allowed");
        self.activity.allow_join_requests();
    }

    pub fn disable_join_requests(&mut self) {
        if self.transport.is_none() {
            return;
        }
        tracing::info!("Join requests disabled");
        self.activity.disable_join_requests();
    }

    /// Drive the manager until the event queue closes
    pub async fn run(&mut self) -> Result<()> {
        let mut events = match self.events_rx.take() {
            Some(events) => events,
            None => return Ok(()),
        };
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        self.events_rx = Some(events);
        Ok(())
    }

    /// Dispatch a single manager event to its handler
    pub async fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Transport(TransportEvent::Ready) => self.handle_ready().await,
            ManagerEvent::Transport(TransportEvent::Closed) => self.handle_closed().await,
            ManagerEvent::Transport(TransportEvent::Spectate { secret }) => {
                self.handle_spectate_secret(secret).await
            }
            ManagerEvent::Transport(TransportEvent::Join { secret }) => {
                self.handle_join_secret(secret).await
            }
            ManagerEvent::Transport(TransportEvent::JoinRequest { user }) => {
                self.handle_join_request(user).await
            }
            ManagerEvent::Session(SessionEvent::SessionChanged { id }) => {
                self.handle_session_changed(id)
            }
            ManagerEvent::Session(SessionEvent::PeersChanged { added, removed }) => {
                self.handle_peers_changed(added, removed)
            }
            ManagerEvent::RefreshTick => self.handle_refresh_tick().await,
        }
    }

    /// Handshake completed: status, immediate push, refresh timer,
    /// subscriptions, session bridge attachment - in that order.
    async fn handle_ready(&mut self) {
        // Dispose may have landed while the handshake was in flight
        let Some(transport) = self.transport.clone() else {
            return;
        };
        self.state = ConnState::Ready;
        tracing::info!("Connected to presence daemon");

        self.status.set_text(STATUS_CONNECTED_TEXT);
        self.status.set_tooltip("Connected to presence daemon");
        let status = Arc::clone(&self.status);
        tokio::spawn(async move {
            tokio::time::sleep(STATUS_REVERT_DELAY).await;
            status.set_text(STATUS_IDLE_TEXT);
        });

        if let Err(e) = self
            .set_activity(self.config.activity.session_elapsed_time)
            .await
        {
            tracing::warn!("Initial activity push failed: {}", e);
        }
        self.start_refresh();

        if let Err(e) = transport.subscribe(SubscriptionKind::ActivitySpectate).await {
            tracing::warn!("Failed to subscribe to spectate events: {}", e);
        }

        // The daemon is still settling its subscription acknowledgement
        // path right after the handshake; space the remaining subscribes
        // out as one-shot tasks.
        let t = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(JOIN_REQUEST_SUBSCRIBE_DELAY).await;
            if let Err(e) = t.subscribe(SubscriptionKind::ActivityJoinRequest).await {
                tracing::warn!("Failed to subscribe to join requests: {}", e);
            }
        });
        let t = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(JOIN_SUBSCRIBE_DELAY).await;
            if let Err(e) = t.subscribe(SubscriptionKind::ActivityJoin).await {
                tracing::warn!("Failed to subscribe to join events: {}", e);
            }
        });

        self.attach_session_events();
    }

    /// The transport dropped underneath us
    async fn handle_closed(&mut self) {
        if !self.config.presence.enabled {
            // Deliberate shutdown, nothing to restore
            return;
        }
        tracing::warn!("Presence daemon connection lost");
        self.dispose().await;
        self.status.set_text(STATUS_RECONNECT_TEXT);
        self.status.set_command(RECONNECT_COMMAND);
        self.status.set_tooltip("");
    }

    async fn handle_spectate_secret(&mut self, secret: String) {
        self.join_from_secret(&secret).await;
    }

    async fn handle_join_secret(&mut self, secret: String) {
        self.join_from_secret(&secret).await;
    }

    /// Decode a daemon secret and join the session it locates. Failures
    /// stop here; nothing propagates into the dispatch loop.
    async fn join_from_secret(&mut self, secret: &str) {
        let Some(api) = self.session.api() else {
            return;
        };
        if let Err(e) = self.join_session(api, secret).await {
            tracing::error!("Failed to join session: {}", e);
        }
    }

    async fn join_session(&self, api: Arc<dyn SessionApi>, secret: &str) -> Result<()> {
        let locator = session::locator_from_secret(secret)?;
        tracing::info!("Joining collaboration session");

        // The collaboration client's locator autofill comes up empty, so
        // park the locator on the clipboard for the user to paste, and put
        // the previous contents back afterwards. The join proceeds whether
        // or not the clipboard cooperates.
        let previous = match self.clipboard.read() {
            Ok(contents) => Some(contents),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        };
        if let Err(e) = self.clipboard.write(&locator) {
            tracing::warn!("{}", e);
        }

        api.join(&locator).await?;

        if let Some(previous) = previous {
            if let Err(e) = self.clipboard.write(&previous) {
                tracing::warn!("{}", e);
            }
        }
        Ok(())
    }

    /// Mediate an inbound join request: exactly one of invite/close is
    /// sent per request
    async fn handle_join_request(&mut self, user: PeerIdentity) {
        let Some(transport) = self.transport.clone() else {
            return;
        };
        tracing::info!("{} wants to join the session", user.name);
        let result = match self.prompt.confirm_join(&user).await {
            JoinDecision::Accept => transport.send_join_invite(&user).await,
            JoinDecision::Decline => transport.close_join_request(&user).await,
        };
        if let Err(e) = result {
            tracing::error!("Failed to answer join request: {}", e);
        }
    }

    fn handle_session_changed(&mut self, id: Option<String>) {
        match id {
            Some(id) if !id.is_empty() => {
                tracing::info!("Collaboration session changed: {}", id);
                self.activity.change_party_id(Some(id));
            }
            _ => {
                tracing::info!("Collaboration session ended");
                self.activity.change_party_id(None);
            }
        }
    }

    fn handle_peers_changed(&mut self, added: Vec<PeerIdentity>, removed: Vec<PeerIdentity>) {
        // When both lists are non-empty only the additions count; removals
        // in the same event are dropped.
        if !added.is_empty() {
            self.activity.increase_party_size(added.len() as u32);
        } else if !removed.is_empty() {
            self.activity.decrease_party_size(removed.len() as u32);
        }
    }

    /// Periodic refresh: re-read configuration, push the current activity.
    /// A failed push is logged and the schedule continues.
    async fn handle_refresh_tick(&mut self) {
        match Config::load() {
            Ok(config) => self.config = config,
            Err(e) => tracing::warn!("Failed to reload config: {}", e),
        }
        if let Err(e) = self
            .set_activity(self.config.activity.session_elapsed_time)
            .await
        {
            tracing::warn!("Activity refresh failed: {}", e);
        }
    }

    /// The only refresh start site: cancel any running timer, then start
    fn start_refresh(&mut self) {
        if let Some(refresh) = self.refresh.take() {
            refresh.cancel();
        }
        self.refresh = Some(RefreshTimer::start(
            self.events_tx.clone(),
            REFRESH_INTERVAL,
        ));
    }

    /// Attach the session bridge event pump. Singleton like the refresh
    /// timer: any previous pump is cancelled first.
    fn attach_session_events(&mut self) {
        let Some(api) = self.session.api() else {
            return;
        };
        let mut events = api.events();
        let tx = self.events_tx.clone();
        if let Some(pump) = self.session_pump.take() {
            pump.abort();
        }
        self.session_pump = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if tx.send(ManagerEvent::Session(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {} session events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}
