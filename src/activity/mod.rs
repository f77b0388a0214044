//! Activity builder - party metadata and presence payload generation

use crate::protocol::{ActivityPayload, PartyInfo};
use crate::session;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Upper bound shown for party size in the broadcast payload
pub const PARTY_MAX_SIZE: u32 = 30;

/// Holds the current party/session metadata and produces a presence
/// payload on demand.
///
/// Mutated exclusively by the connection manager in response to session
/// bridge events or explicit API calls.
#[derive(Debug)]
pub struct Activity {
    /// Current collaboration party, None while working solo
    party_id: Option<String>,

    /// Number of participants in the party
    party_size: u32,

    /// Whether the broadcast payload advertises a spectate secret
    spectate_allowed: bool,

    /// Whether the broadcast payload advertises a join secret
    join_allowed: bool,

    /// When the editor session started
    started_at: DateTime<Utc>,

    /// When the collaboration session started, set alongside the party id
    session_started_at: Option<DateTime<Utc>>,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            party_id: None,
            party_size: 0,
            spectate_allowed: false,
            join_allowed: false,
            started_at: Utc::now(),
            session_started_at: None,
        }
    }

    /// Produce the presence payload for the current state.
    ///
    /// When `session_elapsed` is set and a collaboration session is active,
    /// elapsed time is anchored to the session start instead of the editor
    /// session start.
    pub async fn generate(&self, session_elapsed: bool) -> Result<ActivityPayload> {
        let start = match (session_elapsed, self.session_started_at) {
            (true, Some(session_start)) => session_start,
            _ => self.started_at,
        };

        let party = self.party_id.as_ref().map(|id| PartyInfo {
            id: id.clone(),
            size: self.party_size.min(PARTY_MAX_SIZE),
            max_size: PARTY_MAX_SIZE,
        });

        let details = if self.party_id.is_some() {
            Some("In a collaboration session".to_string())
        } else {
            Some("Working solo".to_string())
        };

        let state = party
            .as_ref()
            .map(|p| format!("Party of {}", p.size.max(1)));

        let join_secret = match (&self.party_id, self.join_allowed) {
            (Some(id), true) => Some(session::secret_from_locator(&session::join_locator(id))),
            _ => None,
        };
        let spectate_secret = match (&self.party_id, self.spectate_allowed) {
            (Some(id), true) => Some(session::secret_from_locator(&session::spectate_locator(id))),
            _ => None,
        };

        Ok(ActivityPayload {
            details,
            state,
            start_timestamp: Some(start.timestamp_millis()),
            party,
            join_secret,
            spectate_secret,
        })
    }

    /// Set or clear the collaboration party id
    pub fn change_party_id(&mut self, id: Option<String>) {
        match id {
            Some(id) if !id.is_empty() => {
                if self.party_id.as_deref() != Some(id.as_str()) {
                    self.session_started_at = Some(Utc::now());
                    // The local user counts as the first participant
                    self.party_size = self.party_size.max(1);
                }
                self.party_id = Some(id);
            }
            _ => {
                self.party_id = None;
                self.party_size = 0;
                self.session_started_at = None;
            }
        }
    }

    /// Grow the party by `n` participants
    pub fn increase_party_size(&mut self, n: u32) {
        self.party_size = self.party_size.saturating_add(n);
    }

    /// Shrink the party by `n` participants, never below zero
    pub fn decrease_party_size(&mut self, n: u32) {
        self.party_size = self.party_size.saturating_sub(n);
    }

    pub fn allow_spectate(&mut self) {
        self.spectate_allowed = true;
    }

    pub fn disable_spectate(&mut self) {
        self.spectate_allowed = false;
    }

    pub fn allow_join_requests(&mut self) {
        self.join_allowed = true;
    }

    pub fn disable_join_requests(&mut self) {
        self.join_allowed = false;
    }

    /// Reset to the no-party state. Idempotent.
    pub fn dispose(&mut self) {
        self.party_id = None;
        self.party_size = 0;
        self.spectate_allowed = false;
        self.join_allowed = false;
        self.session_started_at = None;
    }

    pub fn party_id(&self) -> Option<&str> {
        self.party_id.as_deref()
    }

    pub fn party_size(&self) -> u32 {
        self.party_size
    }

    pub fn spectate_allowed(&self) -> bool {
        self.spectate_allowed
    }

    pub fn join_allowed(&self) -> bool {
        self.join_allowed
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}
