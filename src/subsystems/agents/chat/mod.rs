//! Chat agent — turns one inbound message into a completion round trip.
//!
//! ```text
//! channel ──handle(user, text)──▶ ChatAgent ──lock──▶ ConversationStore
//!                                     │
//!                                     └──complete(turns)──▶ LlmProvider
//! ```
//!
//! The agent owns the [`ConversationStore`]; channels only see the text
//! chunks that come back.

pub mod chunk;

use tracing::{debug, info, warn};

use crate::llm::{LlmProvider, ProviderError};
use crate::subsystems::memory::{ConversationStore, Turn, UserId};

pub use chunk::{MAX_MESSAGE_LENGTH, split_chunks, truncate_chars};

/// Acknowledgement sent after `/reset`.
pub const RESET_ACK: &str = "🔄 Conversation history cleared!";

pub struct ChatAgent {
    provider: LlmProvider,
    store: ConversationStore,
}

impl ChatAgent {
    pub fn new(provider: LlmProvider, store: ConversationStore) -> Self {
        Self { provider, store }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Record `text`, ask the provider for a reply and return it in
    /// deliverable chunks.
    ///
    /// The user's transcript stays locked for the whole round trip, so a
    /// second message from the same user waits for this one to finish.
    /// On failure only the user turn is kept and a single error chunk is
    /// returned.
    pub async fn handle(&self, user_id: UserId, text: &str) -> Vec<String> {
        let mut session = self.store.lock(user_id).await;
        session.append(Turn::user(text));

        debug!(%user_id, turns = session.conversation().len(), "dispatching to llm provider");

        match self.provider.complete(session.conversation().turns()).await {
            Ok(reply) => {
                session.append(Turn::assistant(reply.as_str()));
                let chunks = split_chunks(&reply, MAX_MESSAGE_LENGTH);
                info!(
                    %user_id,
                    reply_chars = reply.chars().count(),
                    chunks = chunks.len(),
                    "reply ready"
                );
                chunks
            }
            Err(e) => {
                warn!(%user_id, error = %e, "completion failed");
                vec![user_facing_error(&e)]
            }
        }
    }

    /// Clear the user's history back to the system prompt.
    pub async fn handle_reset(&self, user_id: UserId) -> String {
        self.store.reset(user_id).await;
        info!(%user_id, "conversation reset");
        RESET_ACK.to_string()
    }

    /// Greeting for `/start`. Does not touch the store.
    pub fn handle_start(&self, user_id: UserId, display_name: &str) -> String {
        debug!(%user_id, "welcome requested");
        welcome_message(display_name)
    }
}

/// Templated greeting shown on `/start`.
pub fn welcome_message(display_name: &str) -> String {
    format!(
        "Hello {display_name}! 🤖\n\
         I'm your ChatGPT Telegram bot.\n\n\
         Just send me a message and I'll respond like ChatGPT!\n\
         Use /reset to clear our conversation history."
    )
}

/// Render a provider failure for the end user, capped at one message.
pub fn user_facing_error(error: &ProviderError) -> String {
    truncate_chars(&format!("⚠️ Error: {error}"), MAX_MESSAGE_LENGTH)
}
