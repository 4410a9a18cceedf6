//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are immutable; clone them freely.
//! The `complete` method is `async fn` on the enum so callers need no
//! trait-object machinery.

pub mod providers;

use thiserror::Error;

use crate::subsystems::memory::Turn;

// ── Error ─────────────────────────────────────────────────────────────────────

/// Everything that can go wrong between sending a conversation and getting a
/// reply back. All variants are recoverable per message.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty reply from completion service")]
    EmptyReply,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
}

impl LlmProvider {
    /// Send the ordered conversation and return the generated reply text.
    pub async fn complete(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(turns).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(turns).await,
        }
    }

    /// Short label for logs and the startup banner.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
        }
    }
}
