//! Editor-facing surfaces - status indicator and join-request prompts
//!
//! The connection manager only ever calls into these; it never queries
//! them back.

use crate::protocol::PeerIdentity;
use async_trait::async_trait;

/// Fire-and-forget status indicator in the host's chrome
pub trait StatusSurface: Send + Sync {
    fn set_text(&self, text: &str);
    fn set_tooltip(&self, tooltip: &str);
    fn set_command(&self, command: &str);
}

/// Status surface for headless hosts, routed through the log
pub struct LogStatus;

impl StatusSurface for LogStatus {
    fn set_text(&self, text: &str) {
        if !text.is_empty() {
            tracing::info!("Status: {}", text);
        }
    }

    fn set_tooltip(&self, _tooltip: &str) {}

    fn set_command(&self, command: &str) {
        tracing::info!("Status action available: {}", command);
    }
}

/// Outcome of a join-request prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    Accept,
    Decline,
}

/// Presents a join request to the user with exactly two options.
///
/// Dismissal counts as Decline; exactly one of accept/reject is sent per
/// request.
#[async_trait]
pub trait JoinPrompt: Send + Sync {
    async fn confirm_join(&self, user: &PeerIdentity) -> JoinDecision;
}

/// Prompt for hosts without an interactive surface: declines every request
pub struct DeclinePrompt;

#[async_trait]
impl JoinPrompt for DeclinePrompt {
    async fn confirm_join(&self, user: &PeerIdentity) -> JoinDecision {
        tracing::info!("Declining join request from {} (no interactive host)", user.name);
        JoinDecision::Decline
    }
}
