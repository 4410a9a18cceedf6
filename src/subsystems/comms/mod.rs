//! Comms subsystem — manages all external I/O channels.
//!
//! # Architecture
//!
//! Each channel (console, Telegram) implements [`runtime::Component`] and is
//! spawned as an independent task by [`start`]. Channels capture their
//! shared [`Arc<CommsState>`] at construction time; the generic
//! `Component::run` signature only carries the shutdown token.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, new users). It is drained by a
//! short-lived background task that ends once every channel has dropped
//! its sender.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component

mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-telegram")]
pub mod telegram;

pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::agents::ChatAgent;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn all configured comms channels and return a [`SubsystemHandle`].
///
/// Synchronous: returns as soon as the tasks are spawned. If any channel
/// exits with an error the shared `shutdown` token is cancelled so siblings
/// stop too.
pub fn start(
    config: &Config,
    agent: Arc<ChatAgent>,
    shutdown: CancellationToken,
) -> Result<SubsystemHandle, AppError> {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(agent, event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    if config.comms_pty_should_load() {
        #[cfg(feature = "channel-pty")]
        {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
        #[cfg(not(feature = "channel-pty"))]
        tracing::warn!("pty channel enabled in config but not compiled in");
    }

    if config.comms_telegram_should_load() {
        #[cfg(feature = "channel-telegram")]
        {
            let token = config
                .telegram_token
                .clone()
                .ok_or_else(|| AppError::Config("missing TELEGRAM_TOKEN".into()))?;
            info!(mode = config.delivery.label(), "loading telegram channel");
            components.push(Box::new(telegram::TelegramChannel::new(
                "telegram0",
                state.clone(),
                token,
                config.delivery.clone(),
            )));
        }
        #[cfg(not(feature = "channel-telegram"))]
        tracing::warn!("telegram channel enabled in config but not compiled in");
    }

    if components.is_empty() {
        return Err(AppError::Config("no comms channel could be started".into()));
    }

    // Monitoring only; errors here never affect channel lifecycle.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::SessionStarted { ref channel_id, user_id } => {
                    info!(channel_id, %user_id, "new conversation");
                }
            }
        }
    });

    Ok(spawn_components(components, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::subsystems::memory::ConversationStore;

    fn agent() -> Arc<ChatAgent> {
        Arc::new(ChatAgent::new(
            LlmProvider::Dummy(DummyProvider),
            ConversationStore::new("sys", None),
        ))
    }

    #[tokio::test]
    async fn no_channels_is_an_error() {
        let mut config = Config::test_default();
        config.comms.pty.enabled = false;
        let result = start(&config, agent(), CancellationToken::new());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[cfg(feature = "channel-telegram")]
    #[tokio::test]
    async fn telegram_without_token_is_an_error() {
        let mut config = Config::test_default();
        config.comms.pty.enabled = false;
        config.comms.telegram.enabled = true;
        let result = start(&config, agent(), CancellationToken::new());
        let err = result.err().expect("start should fail");
        assert!(err.to_string().contains("TELEGRAM_TOKEN"));
    }
}
