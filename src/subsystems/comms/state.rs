//! Shared state for the Comms subsystem — capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below. The [`ChatAgent`] (and the conversation store inside it)
//! is private; channels cannot read or edit transcripts directly.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! manager ("I shut down", "new session started") without touching the
//! agent. The manager owns the receiver end.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::subsystems::agents::ChatAgent;
use crate::subsystems::memory::UserId;

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A user talked to the bot for the first time since startup.
    SessionStarted { channel_id: String, user_id: UserId },
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    agent: Arc<ChatAgent>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(agent: Arc<ChatAgent>, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { agent, event_tx }
    }

    /// Relay `content` from `user_id` to the chat agent and return the reply
    /// chunks, in delivery order.
    pub async fn send_message(&self, channel_id: &str, user_id: UserId, content: &str) -> Vec<String> {
        if !self.agent.store().contains(user_id) {
            self.report_event(CommsEvent::SessionStarted {
                channel_id: channel_id.to_string(),
                user_id,
            });
        }
        self.agent.handle(user_id, content).await
    }

    /// `/reset` — returns the acknowledgement text.
    pub async fn reset(&self, user_id: UserId) -> String {
        self.agent.handle_reset(user_id).await
    }

    /// `/start` — returns the greeting text.
    pub fn welcome(&self, user_id: UserId, display_name: &str) -> String {
        self.agent.handle_start(user_id, display_name)
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
