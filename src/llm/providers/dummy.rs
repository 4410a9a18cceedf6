//! Dummy LLM provider — echoes the latest user turn prefixed with `[echo]`.
//! Used for exercising the full relay without a real API key.

use crate::llm::ProviderError;
use crate::subsystems::memory::{Role, Turn};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        Ok(format!("[echo] {last_user}"))
    }
}
